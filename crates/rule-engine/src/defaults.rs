//! Built-in match rules, enabled with `use_default_rules`.

/// Default match rules, in evaluation order.
pub const DEFAULT_RULES: &[&str] = &[
    // console login without MFA, AWS SSO sessions excluded
    r#"event.get("eventName") == "ConsoleLogin" and event.get("additionalEventData.MFAUsed") != "Yes" and "assumed-role/AWSReservedSSO" not in (event.get("userIdentity.arn") or "")"#,
    r#"(event.get("errorCode") or "").endswith("UnauthorizedOperation")"#,
    r#"event.get("errorCode") == "AccessDenied" and event.get("userIdentity.accountId") != "ANONYMOUS_PRINCIPAL""#,
    // root doing anything beyond reads
    r#"event.get("userIdentity.type") == "Root" and not (event.get("eventName") or "").startswith(("Get", "Describe", "List", "Head"))"#,
    r#"event.get("eventSource") == "cloudtrail.amazonaws.com" and event.get("eventName") in ["StopLogging", "UpdateTrail", "DeleteTrail"]"#,
    // changes to the notifier's own function
    r#"event.get("eventSource") == "lambda.amazonaws.com" and (event.get("eventName") or "").startswith(("UpdateFunctionCode", "UpdateFunctionConfiguration")) and "trailpost" in (event.get("responseElements.functionName") or "")"#,
];

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;
    use crate::classifier::classify;
    use crate::evaluator::Rule;

    fn defaults() -> Vec<Rule> {
        DEFAULT_RULES.iter().map(|s| Rule::compile(*s)).collect()
    }

    fn matches(record: Value) -> bool {
        let result = classify(&record, &defaults(), &[]);
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        result.should_process
    }

    #[test]
    fn all_defaults_compile() {
        for rule in defaults() {
            assert!(rule.is_valid(), "{:?}: {:?}", rule, rule.compile_error());
        }
    }

    #[test]
    fn console_login_without_mfa_matches() {
        assert!(matches(json!({
            "eventName": "ConsoleLogin",
            "additionalEventData": {"MFAUsed": "No"},
            "userIdentity": {"arn": "arn:aws:iam::111:user/alice"}
        })));
    }

    #[test]
    fn console_login_with_mfa_does_not_match() {
        assert!(!matches(json!({
            "eventName": "ConsoleLogin",
            "additionalEventData": {"MFAUsed": "Yes"},
            "userIdentity": {"arn": "arn:aws:iam::111:user/alice"}
        })));
    }

    #[test]
    fn sso_console_login_does_not_match() {
        assert!(!matches(json!({
            "eventName": "ConsoleLogin",
            "additionalEventData": {"MFAUsed": "No"},
            "userIdentity": {
                "arn": "arn:aws:sts::111:assumed-role/AWSReservedSSO_Admin_abc/alice"
            }
        })));
    }

    #[test]
    fn anonymous_access_denied_does_not_match() {
        assert!(!matches(json!({
            "eventName": "GetObject",
            "errorCode": "AccessDenied",
            "userIdentity": {"accountId": "ANONYMOUS_PRINCIPAL"}
        })));
    }

    #[test]
    fn access_denied_from_account_matches() {
        assert!(matches(json!({
            "eventName": "GetObject",
            "errorCode": "AccessDenied",
            "userIdentity": {"accountId": "111111111111"}
        })));
    }

    #[test]
    fn unauthorized_operation_suffix_matches() {
        assert!(matches(json!({
            "eventName": "RunInstances",
            "errorCode": "Client.UnauthorizedOperation"
        })));
    }

    #[test]
    fn null_error_code_is_not_an_error() {
        assert!(!matches(json!({"eventName": "RunInstances", "errorCode": null})));
    }

    #[test]
    fn root_writes_match_and_reads_do_not() {
        let root = |name: &str| json!({"eventName": name, "userIdentity": {"type": "Root"}});
        assert!(matches(root("CreateUser")));
        for read in ["GetUser", "ListUsers", "DescribeInstances", "HeadBucket"] {
            assert!(!matches(root(read)), "{read} should not match");
        }
    }

    #[test]
    fn cloudtrail_tampering_matches() {
        for name in ["StopLogging", "UpdateTrail", "DeleteTrail"] {
            assert!(matches(json!({
                "eventName": name,
                "eventSource": "cloudtrail.amazonaws.com"
            })));
        }
        assert!(!matches(json!({
            "eventName": "LookupEvents",
            "eventSource": "cloudtrail.amazonaws.com"
        })));
    }

    #[test]
    fn own_function_update_matches() {
        let update = |function: &str| {
            json!({
                "eventName": "UpdateFunctionCode20150331v2",
                "eventSource": "lambda.amazonaws.com",
                "responseElements": {"functionName": function}
            })
        };
        assert!(matches(update("trailpost-notifier")));
        assert!(!matches(update("billing-export")));
    }
}
