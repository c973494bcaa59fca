//! Error type for parsing and model validation.

/// Errors raised while parsing or validating layout descriptors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("malformed XLF: {0}")]
    MalformedXlf(String),

    #[error("XLF missing required attribute `{0}` on <{1}>")]
    MissingAttribute(&'static str, &'static str),

    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::DeError),

    #[error("xml serialize error: {0}")]
    XmlSe(#[from] quick_xml::SeError),
}

pub type Result<T> = std::result::Result<T, Error>;
