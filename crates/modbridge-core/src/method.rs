//! HTTP-like verbs carried by the call envelope.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Verb of a generic call.
///
/// On the wire a method is its upper-case name. Decoding is lenient: any
/// string that is not a known verb becomes [`Method::Unspecified`], and it is
/// up to the receiving implementation to reject such calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    #[default]
    Unspecified,
}

impl Method {
    /// Wire name of the method. `Unspecified` encodes as the empty string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Unspecified => "",
        }
    }

    /// Parse a wire name, mapping anything unrecognized to `Unspecified`.
    pub fn parse_lenient(s: &str) -> Self {
        s.parse().unwrap_or(Method::Unspecified)
    }

    pub fn is_specified(&self) -> bool {
        *self != Method::Unspecified
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Unspecified => f.write_str("UNSPECIFIED"),
            other => f.write_str(other.as_str()),
        }
    }
}

impl FromStr for Method {
    type Err = UnknownMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "PATCH" => Ok(Method::Patch),
            "DELETE" => Ok(Method::Delete),
            _ => Err(UnknownMethod(s.to_string())),
        }
    }
}

impl From<String> for Method {
    fn from(s: String) -> Self {
        Method::parse_lenient(&s)
    }
}

impl From<Method> for String {
    fn from(method: Method) -> Self {
        method.as_str().to_string()
    }
}

/// A verb string that is not one of the known methods.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown method: {0:?}")]
pub struct UnknownMethod(pub String);
