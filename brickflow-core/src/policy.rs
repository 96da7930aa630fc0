//! API version policy.
//!
//! A mod declares an `apiVersion`; the flags derived from it are resolved
//! once at the start of a pipeline run and threaded explicitly through every
//! rendering call. There is no global mode: two pipelines with different
//! versions can run concurrently without interference.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Declared schema version of a mod definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiVersion {
    V1,
    V2,
    V3,
}

impl ApiVersion {
    pub fn parse(version: &str) -> Option<Self> {
        match version {
            "v1" => Some(Self::V1),
            "v2" => Some(Self::V2),
            "v3" => Some(Self::V3),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::V1 => "v1",
            Self::V2 => "v2",
            Self::V3 => "v3",
        }
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Behavioral flags keyed by [`ApiVersion`].
///
/// - `explicit_render`: bare strings are literals; only tagged expressions
///   render (v3). Off, bare strings are tried as context paths first with a
///   template fallback (v1/v2 implicit mode).
/// - `explicit_data_flow`: step outputs are visible only under their
///   `@outputKey` binding (v2+). Off, the previous step's output also feeds
///   the next step's render scope (v1 implicit chaining).
/// - `autoescape`: HTML-escape template interpolations (pre-v3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiVersionOptions {
    pub version: ApiVersion,
    pub explicit_render: bool,
    pub explicit_data_flow: bool,
    pub autoescape: bool,
}

impl ApiVersionOptions {
    pub fn for_version(version: ApiVersion) -> Self {
        match version {
            ApiVersion::V1 => Self {
                version,
                explicit_render: false,
                explicit_data_flow: false,
                autoescape: true,
            },
            ApiVersion::V2 => Self {
                version,
                explicit_render: false,
                explicit_data_flow: true,
                autoescape: true,
            },
            ApiVersion::V3 => Self {
                version,
                explicit_render: true,
                explicit_data_flow: true,
                autoescape: false,
            },
        }
    }
}

impl Default for ApiVersionOptions {
    fn default() -> Self {
        Self::for_version(ApiVersion::V3)
    }
}

impl From<ApiVersion> for ApiVersionOptions {
    fn from(version: ApiVersion) -> Self {
        Self::for_version(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v1_is_fully_implicit() {
        let opts = ApiVersionOptions::for_version(ApiVersion::V1);
        assert!(!opts.explicit_render);
        assert!(!opts.explicit_data_flow);
        assert!(opts.autoescape);
    }

    #[test]
    fn v2_adds_explicit_data_flow() {
        let opts = ApiVersionOptions::for_version(ApiVersion::V2);
        assert!(!opts.explicit_render);
        assert!(opts.explicit_data_flow);
        assert!(opts.autoescape);
    }

    #[test]
    fn v3_is_fully_explicit_without_autoescape() {
        let opts = ApiVersionOptions::for_version(ApiVersion::V3);
        assert!(opts.explicit_render);
        assert!(opts.explicit_data_flow);
        assert!(!opts.autoescape);
    }

    #[test]
    fn version_tags_round_trip() {
        for version in [ApiVersion::V1, ApiVersion::V2, ApiVersion::V3] {
            assert_eq!(ApiVersion::parse(version.as_str()), Some(version));
        }
        assert_eq!(ApiVersion::parse("v4"), None);
    }
}
