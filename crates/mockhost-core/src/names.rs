//! Naming rules the mock service applies to the APIs it serves.

const OPERATION_VERBS: [&str; 2] = ["SUBSCRIBE ", "PUBLISH "];

/// Derives the topic or destination the mock service publishes to for an
/// async API operation.
///
/// Spaces are removed from the API name, a leading `SUBSCRIBE ` or
/// `PUBLISH ` verb is stripped from the operation, and the three parts are
/// joined with `-`. The destination path is kept verbatim.
pub fn derive_topic(api_name: &str, api_version: &str, operation: &str) -> String {
    let api_name: String = api_name.chars().filter(|c| *c != ' ').collect();
    let destination = strip_operation_verb(operation);
    format!("{api_name}-{api_version}-{destination}")
}

fn strip_operation_verb(operation: &str) -> &str {
    OPERATION_VERBS
        .iter()
        .find_map(|verb| operation.strip_prefix(verb))
        .unwrap_or(operation)
}

/// Base URL of the REST mocks for an API, e.g. `{base}/rest/Pastry%20API/1.0`.
pub fn rest_mock_url(base_url: &str, api_name: &str, api_version: &str) -> String {
    mock_url(base_url, "rest", api_name, api_version)
}

pub fn soap_mock_url(base_url: &str, api_name: &str, api_version: &str) -> String {
    mock_url(base_url, "soap", api_name, api_version)
}

pub fn graphql_mock_url(base_url: &str, api_name: &str, api_version: &str) -> String {
    mock_url(base_url, "graphql", api_name, api_version)
}

/// Endpoint used to launch conformance tests against a real implementation.
pub fn validation_url(base_url: &str) -> String {
    format!("{}/api/tests", base_url.trim_end_matches('/'))
}

fn mock_url(base_url: &str, kind: &str, api_name: &str, api_version: &str) -> String {
    format!(
        "{}/{kind}/{}/{}",
        base_url.trim_end_matches('/'),
        urlencoding::encode(api_name),
        urlencoding::encode(api_version)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_topic_strips_subscribe() {
        assert_eq!(
            derive_topic("Pastry orders API", "0.1.0", "SUBSCRIBE pastry/orders"),
            "PastryordersAPI-0.1.0-pastry/orders"
        );
    }

    #[test]
    fn test_derive_topic_strips_publish() {
        assert_eq!(
            derive_topic("Pastry orders API", "0.1.0", "PUBLISH pastry/orders"),
            "PastryordersAPI-0.1.0-pastry/orders"
        );
    }

    #[test]
    fn test_derive_topic_without_verb_keeps_operation() {
        assert_eq!(
            derive_topic("User signed-up API", "1.0", "user/signedup"),
            "Usersigned-upAPI-1.0-user/signedup"
        );
    }

    #[test]
    fn test_derive_topic_verb_is_case_sensitive() {
        assert_eq!(
            derive_topic("Api", "1", "subscribe orders"),
            "Api-1-subscribe orders"
        );
    }

    #[test]
    fn test_derive_topic_requires_separating_space() {
        assert_eq!(derive_topic("Api", "1", "PUBLISHorders"), "Api-1-PUBLISHorders");
    }

    #[test]
    fn test_derive_topic_strips_only_one_verb() {
        assert_eq!(
            derive_topic("Api", "1", "SUBSCRIBE PUBLISH orders"),
            "Api-1-PUBLISH orders"
        );
    }

    #[test]
    fn test_rest_mock_url_encodes_api_name() {
        assert_eq!(
            rest_mock_url("http://localhost:8080/", "API Pastries", "0.0.1"),
            "http://localhost:8080/rest/API%20Pastries/0.0.1"
        );
    }

    #[test]
    fn test_other_mock_urls() {
        assert_eq!(
            soap_mock_url("http://h:1", "HelloService Mock", "0.9"),
            "http://h:1/soap/HelloService%20Mock/0.9"
        );
        assert_eq!(
            graphql_mock_url("http://h:1", "Movie Graph API", "1.0"),
            "http://h:1/graphql/Movie%20Graph%20API/1.0"
        );
        assert_eq!(validation_url("http://h:1"), "http://h:1/api/tests");
    }

    mod property_topic_derivation {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn property_topic_never_contains_api_name_spaces(
                name in "[A-Za-z ]{1,20}",
                version in "[0-9]\\.[0-9]\\.[0-9]",
                path in "[a-z]{1,8}/[a-z]{1,8}",
            ) {
                let topic = derive_topic(&name, &version, &format!("SUBSCRIBE {path}"));
                let expected_prefix = format!("{}-{}-", name.replace(' ', ""), version);
                prop_assert!(topic.starts_with(&expected_prefix));
                prop_assert!(topic.ends_with(&path));
            }

            #[test]
            fn property_publish_and_subscribe_agree(
                name in "[A-Za-z ]{1,20}",
                path in "[a-z/]{1,16}",
            ) {
                prop_assert_eq!(
                    derive_topic(&name, "1.0", &format!("PUBLISH {path}")),
                    derive_topic(&name, "1.0", &format!("SUBSCRIBE {path}"))
                );
            }
        }
    }
}
