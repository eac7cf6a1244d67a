use std::collections::HashMap;

/// Parse query parameters from a URI string
///
/// Handles URL decoding and returns a HashMap of parameter key-value pairs.
/// Multiple values for the same key are not supported (only the last is kept).
///
/// # Example
/// ```
/// use yatube::core::query_params::parse_query_params;
///
/// let params = parse_query_params("/cats?page=2&search=fridge%20door");
/// assert_eq!(params.get("page"), Some(&"2".to_string()));
/// assert_eq!(params.get("search"), Some(&"fridge door".to_string()));
/// ```
pub fn parse_query_params(uri: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();

    if let Some(query_start) = uri.find('?') {
        let query = &uri[query_start + 1..];
        for param in query.split('&').filter(|p| !p.is_empty()) {
            if let Some(eq_idx) = param.find('=') {
                let key = &param[..eq_idx];
                let encoded_value = &param[eq_idx + 1..];
                let decoded = urlencoding::decode(encoded_value)
                    .unwrap_or(std::borrow::Cow::Borrowed(encoded_value))
                    .to_string();
                params.insert(key.to_string(), decoded);
            } else {
                // Flag parameter without value
                params.insert(param.to_string(), String::new());
            }
        }
    }

    params
}

/// Get a string parameter from parsed query params with optional default
pub fn get_string(params: &HashMap<String, String>, key: &str, default: Option<&str>) -> Option<String> {
    params
        .get(key)
        .cloned()
        .or_else(|| default.map(|d| d.to_string()))
}

/// Raw `page` parameter; the paginator decides what it means.
pub fn get_page(params: &HashMap<String, String>) -> Option<&str> {
    params.get("page").map(String::as_str)
}
