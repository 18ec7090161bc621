// ABOUTME: Integration tests for validated names and identifiers.
// ABOUTME: Property checks that derived names always pass validation.

use autodeploy::types::*;
use proptest::prelude::*;

mod app_name_tests {
    use super::*;

    #[test]
    fn derive_falls_back_when_nothing_usable_remains() {
        assert_eq!(AppName::derive("___").as_str(), "app");
        assert_eq!(AppName::derive("").as_str(), "app");
    }

    #[test]
    fn deserialize_rejects_invalid_names() {
        assert!(serde_yaml::from_str::<AppName>("\"Shop\"").is_err());
        let name: AppName = serde_yaml::from_str("shop-api").unwrap();
        assert_eq!(name.as_str(), "shop-api");
    }

    proptest! {
        #[test]
        fn derived_names_are_always_valid(raw in ".{0,80}") {
            let derived = AppName::derive(&raw);
            prop_assert!(AppName::new(derived.as_str()).is_ok());
        }

        #[test]
        fn derive_keeps_valid_names(raw in "[a-z][a-z0-9]{0,10}(-[a-z0-9]{1,8}){0,2}") {
            let derived = AppName::derive(&raw);
            prop_assert_eq!(derived.as_str(), raw.as_str());
        }
    }
}

mod job_id_tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_round_trip_through_json() {
        let a = JobId::new();
        let b = JobId::new();
        assert_ne!(a, b);
        let json = serde_json::to_string(&a).unwrap();
        assert_eq!(json, format!("\"{a}\""));
        assert_eq!(serde_json::from_str::<JobId>(&json).unwrap(), a);
    }

    #[test]
    fn parse_error_names_the_input() {
        let err = "not-a-job".parse::<JobId>().unwrap_err();
        assert!(err.to_string().contains("not-a-job"));
    }
}

mod resource_id_tests {
    use super::*;

    #[test]
    fn resource_ids_display_their_value() {
        let sg = SecurityGroupId::new("sg-0abc");
        let instance = InstanceId::new("i-0123");
        let function = FunctionName::new("shop-fn");
        assert_eq!(sg.to_string(), "sg-0abc");
        assert_eq!(instance.as_str(), "i-0123");
        assert_eq!(function.clone().into_inner(), "shop-fn");
    }
}
