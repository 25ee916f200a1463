use std::fmt;

use crate::{ParamsEncoder, RequestParams, TransportError};

/// HTTP methods a generated endpoint may request.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum HttpMethod {
    Get,
    Head,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => Self::GET,
            HttpMethod::Head => Self::HEAD,
            HttpMethod::Post => Self::POST,
            HttpMethod::Put => Self::PUT,
            HttpMethod::Delete => Self::DELETE,
        }
    }
}

/// Fully formed outbound request for a single attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestEnvelope {
    method: HttpMethod,
    url: String,
    headers: Vec<(String, String)>,
    body: Option<Vec<u8>>,
}

impl RequestEnvelope {
    pub fn new(
        method: HttpMethod,
        url: impl Into<String>,
        headers: Vec<(String, String)>,
        body: Option<Vec<u8>>,
    ) -> Self {
        Self {
            method,
            url: url.into(),
            headers,
            body,
        }
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }
}

/// Joins `base_url` and `prefix`, substitutes `{name}` path placeholders and
/// appends the remaining parameters as a query string.
///
/// Parameters consumed by a placeholder are not repeated in the query.
pub(crate) fn build_url(
    base_url: &str,
    prefix: &str,
    params: &RequestParams,
    encoder: &dyn ParamsEncoder,
) -> Result<String, TransportError> {
    let mut query_params = params.clone();
    let path = substitute_placeholders(prefix, &mut query_params)?;

    let mut url = base_url.to_owned();
    let path = path.trim_start_matches('/');
    if !path.is_empty() {
        if !url.ends_with('/') {
            url.push('/');
        }
        url.push_str(path);
    }

    let query = encoder.encode(&query_params);
    if !query.is_empty() {
        url.push(if url.contains('?') { '&' } else { '?' });
        url.push_str(&query);
    }

    reqwest::Url::parse(&url).map_err(|err| TransportError::InvalidUrl(format!("{url}: {err}")))?;
    Ok(url)
}

fn substitute_placeholders(
    prefix: &str,
    params: &mut RequestParams,
) -> Result<String, TransportError> {
    let mut path = String::with_capacity(prefix.len());
    let mut rest = prefix;

    while let Some(start) = rest.find('{') {
        path.push_str(&rest[..start]);
        let tail = &rest[start + 1..];
        let end = tail.find('}').ok_or_else(|| {
            TransportError::Request(format!("unterminated path placeholder in '{prefix}'"))
        })?;
        let name = &tail[..end];
        let value = params.remove(name).ok_or_else(|| {
            TransportError::Request(format!(
                "missing value for path placeholder '{{{name}}}' in '{prefix}'"
            ))
        })?;
        path.push_str(&urlencoding::encode(&value));
        rest = &tail[end + 1..];
    }
    path.push_str(rest);

    Ok(path)
}
