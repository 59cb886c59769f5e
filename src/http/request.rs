use crate::http::headers::HeaderMap;
use crate::http::method::{Method, Version};

#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub version: Version,
    /// Normalized, percent-decoded.
    pub path: String,
    /// Raw, leading `?` preserved (empty if absent).
    pub query: String,
    /// Lowercased.
    pub host: String,
    pub header: HeaderMap,
    pub content: Vec<u8>,
    pub keep_alive: bool,
}

impl Request {
    /// `PATH_INFO`: the path suffix after `ext` (empty if `ext` isn't found).
    pub fn path_info(&self, ext: &str) -> String {
        match self.path.find(ext) {
            Some(pos) => self.path[pos + ext.len()..].to_string(),
            None => String::new(),
        }
    }

    /// `SCRIPT_NAME` tail: the path up to and including `ext`.
    pub fn path_up_to_ext<'a>(&'a self, ext: &str) -> &'a str {
        match self.path.find(ext) {
            Some(pos) => &self.path[..pos + ext.len()],
            None => &self.path,
        }
    }
}
