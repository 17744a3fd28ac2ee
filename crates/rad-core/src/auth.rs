use http::HeaderMap;

use rad_common::{ErrorKind, GatewayError};
use rad_provider_core::{KeyIdentity, KeyStore};

/// Extraction order: `Authorization: Bearer` → `X-Api-Key` →
/// `X-Goog-Api-Key` → `?key=`.
pub fn extract_api_key(headers: &HeaderMap, query: Option<&str>) -> Option<String> {
    if let Some(auth) = header_value(headers, "authorization") {
        let auth = auth.trim();
        if let Some(token) = auth
            .strip_prefix("Bearer ")
            .or_else(|| auth.strip_prefix("bearer "))
        {
            let token = token.trim();
            if !token.is_empty() {
                return Some(token.to_string());
            }
        }
    }
    if let Some(value) = header_value(headers, "x-api-key") {
        return Some(value);
    }
    if let Some(value) = header_value(headers, "x-goog-api-key") {
        return Some(value);
    }
    query_key(query.unwrap_or(""))
}

pub fn authenticate(
    keys: &dyn KeyStore,
    headers: &HeaderMap,
    query: Option<&str>,
) -> Result<KeyIdentity, GatewayError> {
    let secret = extract_api_key(headers, query).ok_or_else(|| {
        GatewayError::new(ErrorKind::AuthenticationFailed, "missing api key")
    })?;
    keys.lookup(&secret)
        .ok_or_else(|| GatewayError::new(ErrorKind::AuthenticationFailed, "invalid api key"))
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn query_key(query: &str) -> Option<String> {
    query
        .split('&')
        .find_map(|pair| pair.strip_prefix("key="))
        .filter(|value| !value.is_empty())
        .map(|value| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(
                http::header::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        map
    }

    #[test]
    fn bearer_wins_over_other_sources() {
        let map = headers(&[
            ("authorization", "Bearer sk-bearer"),
            ("x-api-key", "sk-xapi"),
            ("x-goog-api-key", "sk-goog"),
        ]);
        assert_eq!(
            extract_api_key(&map, Some("key=sk-query")).as_deref(),
            Some("sk-bearer")
        );
    }

    #[test]
    fn fallback_order() {
        let map = headers(&[("x-api-key", "sk-xapi"), ("x-goog-api-key", "sk-goog")]);
        assert_eq!(extract_api_key(&map, None).as_deref(), Some("sk-xapi"));

        let map = headers(&[("x-goog-api-key", "sk-goog")]);
        assert_eq!(extract_api_key(&map, None).as_deref(), Some("sk-goog"));

        let map = headers(&[]);
        assert_eq!(
            extract_api_key(&map, Some("alt=sse&key=sk-query")).as_deref(),
            Some("sk-query")
        );
        assert_eq!(extract_api_key(&map, None), None);
    }

    #[test]
    fn authenticate_maps_to_401() {
        let store = rad_provider_core::MemoryKeyStore::new(&[rad_common::KeyEntry {
            name: "team-a".into(),
            secret: "sk-good".into(),
            enabled: true,
        }]);

        let ok = authenticate(&store, &headers(&[("x-api-key", "sk-good")]), None).unwrap();
        assert_eq!(ok.name, "team-a");

        let err = authenticate(&store, &headers(&[("x-api-key", "sk-bad")]), None).unwrap_err();
        assert_eq!(err.kind, ErrorKind::AuthenticationFailed);
        assert_eq!(err.http_status(), 401);

        let err = authenticate(&store, &headers(&[]), None).unwrap_err();
        assert_eq!(err.kind, ErrorKind::AuthenticationFailed);
    }
}
