/// Represents a parsed request from a client.
///
/// Only the request target matters to this server. The method token is kept
/// for logging, and header lines are kept raw because nothing interprets them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// The first token of the request line (e.g. "GET"), never dispatched on
    pub method: String,
    /// The request target (e.g. "/index.html")
    pub path: String,
    /// Header lines in arrival order, without their line terminators
    pub headers: Vec<String>,
}

impl Request {
    /// Returns the request target without any query string or fragment.
    ///
    /// # Example
    ///
    /// ```
    /// # use docserve::http::request::Request;
    /// let req = Request {
    ///     method: "GET".to_string(),
    ///     path: "/search.html?q=rust#top".to_string(),
    ///     headers: Vec::new(),
    /// };
    /// assert_eq!(req.resource_path(), "/search.html");
    /// ```
    pub fn resource_path(&self) -> &str {
        let end = self
            .path
            .find(['?', '#'])
            .unwrap_or(self.path.len());
        &self.path[..end]
    }
}
