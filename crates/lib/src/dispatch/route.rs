//! Splitting a request URI into section and sub-path.

use crate::constants::INDEX_SECTION;

/// Where a request goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// First segment below the service path, lower-cased. Empty for the root.
    pub section: String,
    /// Registered section answering the request.
    pub section_name: String,
    /// Remaining segments behind a leading `/`.
    pub path: String,
}

impl Route {
    /// Route `uri` relative to `service_path`.
    ///
    /// A URI outside the service path is routed as if the service path were
    /// not there.
    pub fn parse(uri: &str, service_path: &str) -> Self {
        let path = uri.split('?').next().unwrap_or("");
        let relative = path
            .strip_prefix(service_path)
            .or_else(|| {
                path.strip_prefix(service_path.trim_end_matches('/'))
                    .filter(|rest| rest.is_empty() || rest.starts_with('/'))
            })
            .unwrap_or(path)
            .trim_start_matches('/');

        let mut segments = relative.split('/');
        let section = segments.next().unwrap_or("").to_lowercase();
        let path = format!("/{}", segments.collect::<Vec<_>>().join("/"));
        let section_name = if section.is_empty() {
            INDEX_SECTION.to_string()
        } else {
            section.clone()
        };

        Self {
            section,
            section_name,
            path,
        }
    }
}
