use crate::libs::error::{ReportError, Result};

/// Splits `<complexName>_<chainName>` on the last underscore.
///
/// Complex names may contain underscores, chain names may not.
///
/// ```
/// use cmplx::libs::ident::split_identifier;
/// assert_eq!(split_identifier("1ABC_A").unwrap(), ("1ABC", "A"));
/// assert_eq!(split_identifier("foo_bar_C").unwrap(), ("foo_bar", "C"));
/// assert!(split_identifier("1ABC").is_err());
/// ```
pub fn split_identifier(id: &str) -> Result<(&str, &str)> {
    match id.rfind('_') {
        Some(pos) => Ok((&id[..pos], &id[pos + 1..])),
        None => Err(ReportError::Format(format!(
            "identifier without complex/chain delimiter: {}",
            id
        ))),
    }
}
