use url::{ParseError, Url};

/// Resolve a request path into an absolute URL.
///
/// Absolute URLs are returned unchanged. Relative paths are joined onto `base`,
/// and fail with [`ParseError::RelativeUrlWithoutBase`] when there is none.
pub fn resolve(base: Option<&Url>, path: &str) -> Result<Url, ParseError> {
    match Url::parse(path) {
        Ok(url) => Ok(url),
        Err(ParseError::RelativeUrlWithoutBase) => match base {
            Some(base) => base.join(path),
            None => Err(ParseError::RelativeUrlWithoutBase),
        },
        Err(e) => Err(e),
    }
}

/// Append `key=value` pairs to the URL query, percent-encoding them.
pub fn with_query<'a, I>(mut url: Url, pairs: I) -> Url
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut pairs = pairs.into_iter().peekable();
    if pairs.peek().is_some() {
        url.query_pairs_mut().extend_pairs(pairs);
    }
    url
}
