use std::borrow::Cow;
use std::fmt;

use percent_encoding::percent_decode_str;

use crate::error::{FrameError, Result};

/// Multi-valued header storage for one header block.
///
/// Names are matched ASCII case-insensitively and keep their arrival order.
/// When the map is marked as escaped, every read percent-decodes the stored
/// value; raw values stay available through [`HeaderMap::get_raw`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    entries: Vec<(String, Vec<String>)>,
    escaped: bool,
}

impl HeaderMap {
    /// Create an empty, unescaped header map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a header block of `Name: value` lines.
    ///
    /// Blank lines are skipped, lines may end in `\r\n`, and a line starting
    /// with a space or tab continues the previous value.
    pub fn parse(block: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(block)
            .map_err(|_| FrameError::MalformedHeader(String::from_utf8_lossy(block).into_owned()))?;

        let mut map = Self::new();
        for line in text.split('\n') {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if line.trim().is_empty() {
                continue;
            }

            if line.starts_with([' ', '\t']) {
                let Some(last) = map
                    .entries
                    .last_mut()
                    .and_then(|(_, values)| values.last_mut())
                else {
                    return Err(FrameError::MalformedHeader(line.to_string()));
                };
                last.push(' ');
                last.push_str(line.trim());
                continue;
            }

            let Some((name, value)) = line.split_once(':') else {
                return Err(FrameError::MalformedHeader(line.to_string()));
            };
            let name = name.trim();
            if name.is_empty() || name.contains(char::is_whitespace) {
                return Err(FrameError::MalformedHeader(line.to_string()));
            }
            map.append(name, value.trim());
        }

        Ok(map)
    }

    /// Add a value, keeping any values already stored under `name`.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.position(&name) {
            Some(idx) => self.entries[idx].1.push(value),
            None => self.entries.push((name, vec![value])),
        }
    }

    /// First value stored under `name`, percent-decoded if the map is escaped.
    pub fn get(&self, name: &str) -> Option<Cow<'_, str>> {
        self.get_raw(name).map(|raw| self.decode(raw))
    }

    /// Every value stored under `name`, in arrival order.
    pub fn get_all(&self, name: &str) -> Vec<Cow<'_, str>> {
        self.position(name)
            .map(|idx| {
                self.entries[idx]
                    .1
                    .iter()
                    .map(|raw| self.decode(raw))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// First value stored under `name`, exactly as it appeared on the wire.
    pub fn get_raw(&self, name: &str) -> Option<&str> {
        self.position(name)
            .and_then(|idx| self.entries[idx].1.first())
            .map(String::as_str)
    }

    /// Whether a header named `name` is present.
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Whether stored values are percent-escaped.
    pub fn is_escaped(&self) -> bool {
        self.escaped
    }

    /// Mark stored values as percent-escaped (or not).
    pub fn set_escaped(&mut self, escaped: bool) {
        self.escaped = escaped;
    }

    /// Number of distinct header names.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate `(name, value)` pairs in arrival order, one pair per value.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Cow<'_, str>)> + '_ {
        self.entries.iter().flat_map(move |(name, values)| {
            values
                .iter()
                .map(move |raw| (name.as_str(), self.decode(raw)))
        })
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(key, _)| key.eq_ignore_ascii_case(name))
    }

    fn decode<'a>(&self, raw: &'a str) -> Cow<'a, str> {
        if self.escaped {
            percent_decode_str(raw).decode_utf8_lossy()
        } else {
            Cow::Borrowed(raw)
        }
    }
}

impl fmt::Display for HeaderMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, (name, values)) in self.entries.iter().enumerate() {
            if idx > 0 {
                f.write_str("\n")?;
            }
            let joined = values
                .iter()
                .map(|raw| self.decode(raw))
                .collect::<Vec<_>>()
                .join(",");
            write!(f, "{name}: {joined}")?;
        }
        Ok(())
    }
}
