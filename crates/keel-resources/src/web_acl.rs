//! Web application firewall ACL.
//!
//! Rules carry either an `action` or, for rule groups, an `override_action`,
//! chosen by the rule's `type`. The vendor fills `type` in as `REGULAR` when
//! it is left out.

use std::time::Duration;

use keel_core::{Condition, Field, Shape};
use keel_engine::{ResourceLifecycle, ResourceType, WaitPolicy, GONE_STATE};

/// Resource type name.
pub const NAME: &str = "web_acl";

const GROUP: &str = "GROUP";
const DEADLINE: Duration = Duration::from_secs(5 * 60);

/// The web ACL resource type.
#[must_use]
pub fn resource_type() -> ResourceType {
    ResourceType::new(NAME, shape(), lifecycle())
}

fn action() -> Shape {
    Shape::new().field(Field::string("type").vendor("Type"))
}

/// Attribute schema.
#[must_use]
pub fn shape() -> Shape {
    let rule = Shape::new()
        .field(Field::int("priority").vendor("Priority"))
        .field(Field::string("rule_id").vendor("RuleId"))
        .field(Field::string("type").vendor("Type").computed())
        .field(
            Field::block("action", action())
                .vendor("Action")
                .when(Condition::not_equals("type", GROUP)),
        )
        .field(
            Field::block("override_action", action())
                .vendor("OverrideAction")
                .when(Condition::equals("type", GROUP)),
        );

    let field_to_match = Shape::new()
        .field(Field::string("type").vendor("Type"))
        .field(Field::string("data").vendor("Data").omit_empty());

    let logging = Shape::new()
        .field(Field::string("log_destination").vendor("LogDestination"))
        .field(
            Field::block(
                "redacted_fields",
                Shape::new()
                    .field(Field::set("field_to_match", field_to_match).vendor("FieldToMatch")),
            )
            .vendor("RedactedFields"),
        );

    Shape::new()
        .field(Field::string("name").vendor("Name").force_replace())
        .field(Field::string("metric_name").vendor("MetricName").force_replace())
        .field(Field::block("default_action", action()).vendor("DefaultAction"))
        .field(Field::set("rules", rule).vendor("Rules"))
        .field(Field::block("logging_configuration", logging).vendor("LoggingConfiguration"))
        .field(Field::string_map("tags").vendor("Tags"))
}

/// Polling policies. Changes settle almost immediately.
#[must_use]
pub fn lifecycle() -> ResourceLifecycle {
    ResourceLifecycle {
        create: WaitPolicy::new(["active"]).deadline(DEADLINE),
        update: WaitPolicy::new(["active"]).deadline(DEADLINE),
        delete: WaitPolicy::new([GONE_STATE]).deadline(DEADLINE),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::{AttrTree, Value};
    use keel_engine::mapper::{expand, flatten};
    use keel_engine::plan;
    use serde_json::json;

    fn rule(priority: i64, kind: Option<&str>, action: &str) -> AttrTree {
        let mut rule = AttrTree::new()
            .with("priority", priority)
            .with("rule_id", format!("rule-{priority}"));
        let block = Value::block(AttrTree::new().with("type", action));
        match kind {
            Some(GROUP) => {
                rule.insert("type", GROUP);
                rule.insert("override_action", block);
            }
            Some(kind) => {
                rule.insert("type", kind);
                rule.insert("action", block);
            }
            None => {
                rule.insert("action", block);
            }
        }
        rule
    }

    fn acl(rules: Vec<AttrTree>) -> AttrTree {
        AttrTree::new()
            .with("name", "edge")
            .with("metric_name", "edge")
            .with("default_action", Value::block(AttrTree::new().with("type", "ALLOW")))
            .with("rules", Value::set(rules))
    }

    #[test]
    fn rule_branches_expand_by_type() {
        let declared = acl(vec![rule(1, None, "BLOCK"), rule(2, Some(GROUP), "NONE")]);
        let request = expand(&declared, &shape()).unwrap();

        let rules = request["Rules"].as_array().unwrap();
        assert_eq!(rules.len(), 2);
        let regular = rules.iter().find(|r| r["Priority"] == json!(1)).unwrap();
        assert_eq!(regular["Action"], json!({"Type": "BLOCK"}));
        assert!(regular.get("OverrideAction").is_none());
        let group = rules.iter().find(|r| r["Priority"] == json!(2)).unwrap();
        assert_eq!(group["OverrideAction"], json!({"Type": "NONE"}));
        assert!(group.get("Action").is_none());
    }

    #[test]
    fn inactive_branch_in_response_is_ignored() {
        let response = json!({
            "Name": "edge",
            "MetricName": "edge",
            "DefaultAction": {"Type": "ALLOW"},
            "Rules": [{
                "Priority": 2,
                "RuleId": "rule-2",
                "Type": "GROUP",
                "OverrideAction": {"Type": "NONE"},
                "Action": {"Type": "BLOCK"}
            }]
        });
        let tree = flatten(&response, &shape(), None).unwrap();
        let rules = tree.get("rules").and_then(Value::as_blocks).unwrap();
        assert_eq!(rules.len(), 1);
        assert!(rules[0].get("action").is_none());
        assert!(rules[0].get("override_action").is_some());
    }

    #[test]
    fn vendor_filled_rule_type_is_not_drift() {
        let declared = acl(vec![rule(1, None, "BLOCK")]);
        let remote = acl(vec![rule(1, Some("REGULAR"), "BLOCK")]);
        assert!(plan(&declared, &remote, &shape()).is_empty());
    }

    #[test]
    fn switching_rule_to_group_is_in_place() {
        let declared = acl(vec![rule(1, Some(GROUP), "NONE")]);
        let remote = acl(vec![rule(1, Some("REGULAR"), "BLOCK")]);
        let plan = plan(&declared, &remote, &shape());
        assert_eq!(plan.len(), 1);
        assert!(!plan.requires_replace());
        assert_eq!(plan.top_level_attributes(), vec!["rules"]);
    }

    #[test]
    fn renaming_metric_replaces() {
        let declared = acl(vec![]).with("metric_name", "edge2");
        assert!(plan(&declared, &acl(vec![]), &shape()).requires_replace());
    }

    #[test]
    fn redacted_fields_round_trip() {
        let redacted = AttrTree::new().with(
            "field_to_match",
            Value::set([
                AttrTree::new().with("type", "HEADER").with("data", "authorization"),
                AttrTree::new().with("type", "QUERY_STRING"),
            ]),
        );
        let declared = acl(vec![]).with(
            "logging_configuration",
            Value::block(
                AttrTree::new()
                    .with("log_destination", "arn:firehose:edge")
                    .with("redacted_fields", Value::block(redacted)),
            ),
        );
        let request = expand(&declared, &shape()).unwrap();
        let remote = flatten(&serde_json::Value::Object(request), &shape(), None).unwrap();
        assert!(plan(&declared, &remote, &shape()).is_empty());
    }

    #[test]
    fn empty_match_data_is_not_sent() {
        let redacted = AttrTree::new().with(
            "field_to_match",
            Value::set([AttrTree::new().with("type", "URI").with("data", "")]),
        );
        let declared = acl(vec![]).with(
            "logging_configuration",
            Value::block(
                AttrTree::new()
                    .with("log_destination", "arn:firehose:edge")
                    .with("redacted_fields", Value::block(redacted)),
            ),
        );

        let request = serde_json::Value::Object(expand(&declared, &shape()).unwrap());
        assert_eq!(
            request["LoggingConfiguration"]["RedactedFields"]["FieldToMatch"],
            serde_json::json!([{"Type": "URI"}])
        );
        let remote = flatten(&request, &shape(), None).unwrap();
        assert!(plan(&declared, &remote, &shape()).is_empty());
    }
}
