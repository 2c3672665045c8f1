//! Keyword-positional token access over a single log line.
//!
//! The debug-log formats are not a real grammar: fields are found by
//! locating a fixed keyword token and reading its neighbour.

/// Whitespace-split view of one log line.
#[derive(Debug, Clone)]
pub struct LineTokens<'a> {
    tokens: Vec<&'a str>,
}

impl<'a> LineTokens<'a> {
    pub fn new(line: &'a str) -> Self {
        Self {
            tokens: line.split_whitespace().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&'a str> {
        self.tokens.get(index).copied()
    }

    /// Index of the first token equal to `keyword`.
    pub fn position(&self, keyword: &str) -> Option<usize> {
        self.tokens.iter().position(|t| *t == keyword)
    }

    pub fn contains(&self, keyword: &str) -> bool {
        self.position(keyword).is_some()
    }

    /// Token immediately following the first occurrence of `keyword`.
    pub fn after(&self, keyword: &str) -> Option<&'a str> {
        self.position(keyword).and_then(|i| self.get(i + 1))
    }

    /// Like [`LineTokens::after`], with a reason suitable for a parse error.
    pub fn require(&self, keyword: &str) -> Result<&'a str, String> {
        match self.position(keyword) {
            None => Err(format!("missing keyword `{keyword}`")),
            Some(i) => self
                .get(i + 1)
                .ok_or_else(|| format!("no value after keyword `{keyword}`")),
        }
    }

    /// First token starting with `prefix`.
    pub fn starting_with(&self, prefix: &str) -> Option<&'a str> {
        self.tokens.iter().copied().find(|t| t.starts_with(prefix))
    }
}

/// Parse an integer that the library prints in decimal.
pub fn parse_dec<T: std::str::FromStr>(field: &str, value: &str) -> Result<T, String> {
    value
        .parse()
        .map_err(|_| format!("invalid {field} value `{value}`"))
}

/// Parse an integer that the library prints in hex without a prefix.
pub fn parse_hex(field: &str, value: &str) -> Result<u64, String> {
    let digits = value.trim_start_matches("0x");
    u64::from_str_radix(digits, 16).map_err(|_| format!("invalid hex {field} value `{value}`"))
}
