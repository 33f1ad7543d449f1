//! Name/value tables of `Enum8` and `Enum16` columns.

use std::sync::Arc;

use chdata_common::{Result, error::Error};

use crate::scanner;

/// The constants declared by an enum type, in declaration order.
///
/// Cloning is cheap; the table is shared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnumConstants(Arc<[(String, i16)]>);

impl EnumConstants {
    pub fn empty() -> EnumConstants {
        Default::default()
    }

    /// Builds the table from enum type parameters such as `'a'=1` and `'b'=2`.
    ///
    /// A parameter without `=` takes the value after the previous one, starting at 1.
    ///
    /// # Errors
    ///
    /// Returns a parse error for unquoted names, non-integer values, values outside
    /// the 16-bit range and duplicate names or values.
    pub fn parse(parameters: &[String]) -> Result<EnumConstants> {
        let mut entries: Vec<(String, i16)> = Vec::with_capacity(parameters.len());
        let mut next: i32 = 1;
        for param in parameters {
            let (name, value) = Self::parse_one(param, next)?;
            if entries.iter().any(|(n, v)| *n == name || *v == value) {
                return Err(Error::parse(
                    param.as_str(),
                    0,
                    format!("Duplicate enum constant '{name}' = {value}"),
                ));
            }
            next = value as i32 + 1;
            entries.push((name, value));
        }
        Ok(EnumConstants(entries.into()))
    }

    fn parse_one(param: &str, next: i32) -> Result<(String, i16)> {
        let trimmed = param.trim_start();
        let offset = param.len() - trimmed.len();
        if !trimmed.starts_with('\'') {
            return Err(Error::parse(param, offset, "Invalid enum declaration"));
        }
        let mut builder = Vec::new();
        let end = scanner::read_name_or_quoted_string(param, offset, param.len(), &mut builder)?;
        let name = scanner::take_string(&mut builder);

        let rest = param[end..].trim();
        let value = if rest.is_empty() {
            next
        } else if let Some(literal) = rest.strip_prefix('=') {
            literal.trim().parse::<i32>().map_err(|_| {
                Error::parse(param, end, "Invalid character when reading enum")
            })?
        } else {
            return Err(Error::parse(
                param,
                end,
                "Expect = after enum value but not found",
            ));
        };
        let value = i16::try_from(value)
            .map_err(|_| Error::parse(param, end, format!("Enum value {value} is out of range")))?;
        Ok((name, value))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i16)> {
        self.0.iter().map(|(n, v)| (n.as_str(), *v))
    }

    pub fn name_of(&self, value: i16) -> Option<&str> {
        self.0
            .iter()
            .find(|(_, v)| *v == value)
            .map(|(n, _)| n.as_str())
    }

    pub fn value_of(&self, name: &str) -> Option<i16> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }

    pub fn contains_value(&self, value: i16) -> bool {
        self.name_of(value).is_some()
    }

    pub fn min_value(&self) -> Option<i16> {
        self.0.iter().map(|(_, v)| *v).min()
    }

    pub fn max_value(&self) -> Option<i16> {
        self.0.iter().map(|(_, v)| *v).max()
    }
}
