//! Managed search cluster.
//!
//! Domains take tens of minutes to create and to apply configuration changes,
//! and longer to delete. Several encryption settings cannot be changed after
//! creation; turning on EBS storage with an explicit volume type also
//! requires a new domain.

use std::time::Duration;

use keel_core::{Field, Shape};
use keel_engine::{ResourceLifecycle, ResourceType, WaitPolicy, GONE_STATE};

/// Resource type name.
pub const NAME: &str = "search_domain";

/// The search domain resource type.
#[must_use]
pub fn resource_type() -> ResourceType {
    ResourceType::new(NAME, shape(), lifecycle())
}

/// Attribute schema.
#[must_use]
pub fn shape() -> Shape {
    Shape::new()
        .field(Field::string("domain_name").vendor("DomainName").force_replace())
        .field(Field::string("elasticsearch_version").vendor("ElasticsearchVersion"))
        .field(
            Field::block("cluster_config", cluster_config()).vendor("ElasticsearchClusterConfig"),
        )
        .field(Field::block("ebs_options", ebs_options()).vendor("EBSOptions"))
        .field(
            Field::block(
                "encrypt_at_rest",
                Shape::new()
                    .field(Field::bool("enabled").vendor("Enabled").force_replace())
                    .field(
                        Field::string("kms_key_id")
                            .vendor("KmsKeyId")
                            .computed()
                            .force_replace(),
                    ),
            )
            .vendor("EncryptionAtRestOptions"),
        )
        .field(
            Field::block(
                "node_to_node_encryption",
                Shape::new().field(Field::bool("enabled").vendor("Enabled").force_replace()),
            )
            .vendor("NodeToNodeEncryptionOptions"),
        )
        .field(
            Field::block("advanced_security_options", advanced_security_options())
                .vendor("AdvancedSecurityOptions"),
        )
        .field(
            Field::block(
                "domain_endpoint_options",
                Shape::new()
                    .field(Field::bool("enforce_https").vendor("EnforceHTTPS"))
                    .field(
                        Field::string("tls_security_policy")
                            .vendor("TLSSecurityPolicy")
                            .computed(),
                    )
                    .field(Field::bool("custom_endpoint_enabled").vendor("CustomEndpointEnabled"))
                    .field(Field::string("custom_endpoint").vendor("CustomEndpoint")),
            )
            .vendor("DomainEndpointOptions"),
        )
        .field(
            Field::block(
                "snapshot_options",
                Shape::new().field(
                    Field::int("automated_snapshot_start_hour")
                        .vendor("AutomatedSnapshotStartHour"),
                ),
            )
            .vendor("SnapshotOptions"),
        )
        .field(
            Field::block(
                "vpc_options",
                Shape::new()
                    .field(Field::string_set("subnet_ids").vendor("SubnetIds"))
                    .field(Field::string_set("security_group_ids").vendor("SecurityGroupIds")),
            )
            .vendor("VPCOptions"),
        )
        .field(
            Field::set(
                "log_publishing_options",
                Shape::new()
                    .field(Field::string("log_type").vendor("LogType"))
                    .field(
                        Field::string("cloudwatch_log_group_arn")
                            .vendor("CloudWatchLogsLogGroupArn"),
                    )
                    .field(Field::bool("enabled").vendor("Enabled")),
            )
            .vendor("LogPublishingOptions"),
        )
        .field(Field::block("cognito_options", cognito_options()).vendor("CognitoOptions"))
        .field(Field::block("auto_tune_options", auto_tune_options()).vendor("AutoTuneOptions"))
        .field(Field::string("access_policies").vendor("AccessPolicies").computed())
        .field(Field::string_map("tags").vendor("Tags"))
}

fn cluster_config() -> Shape {
    Shape::new()
        .field(Field::string("instance_type").vendor("InstanceType"))
        .field(Field::int("instance_count").vendor("InstanceCount").computed())
        .field(Field::bool("dedicated_master_enabled").vendor("DedicatedMasterEnabled"))
        .field(Field::string("dedicated_master_type").vendor("DedicatedMasterType"))
        .field(Field::int("dedicated_master_count").vendor("DedicatedMasterCount"))
        .field(Field::bool("zone_awareness_enabled").vendor("ZoneAwarenessEnabled"))
        .field(
            Field::block(
                "zone_awareness_config",
                Shape::new()
                    .field(Field::int("availability_zone_count").vendor("AvailabilityZoneCount")),
            )
            .vendor("ZoneAwarenessConfig"),
        )
        .field(Field::bool("warm_enabled").vendor("WarmEnabled"))
        .field(Field::string("warm_type").vendor("WarmType"))
        .field(Field::int("warm_count").vendor("WarmCount"))
}

fn ebs_options() -> Shape {
    Shape::new()
        .field(Field::bool("ebs_enabled").vendor("EBSEnabled"))
        .field(Field::int("volume_size").vendor("VolumeSize"))
        .field(
            Field::string("volume_type")
                .vendor("VolumeType")
                .computed()
                .force_replace_when("ebs_enabled", false, true),
        )
        .field(Field::int("iops").vendor("Iops"))
}

fn advanced_security_options() -> Shape {
    Shape::new()
        .field(Field::bool("enabled").vendor("Enabled").force_replace())
        .field(
            Field::bool("internal_user_database_enabled").vendor("InternalUserDatabaseEnabled"),
        )
        .field(
            Field::block(
                "master_user_options",
                Shape::new()
                    .field(Field::string("master_user_arn").vendor("MasterUserARN"))
                    .field(Field::string("master_user_name").vendor("MasterUserName"))
                    .field(
                        Field::string("master_user_password")
                            .vendor("MasterUserPassword")
                            .write_only(),
                    ),
            )
            .vendor("MasterUserOptions"),
        )
}

/// Dashboard sign-in through an identity pool.
fn cognito_options() -> Shape {
    Shape::new()
        .field(Field::bool("enabled").vendor("Enabled"))
        .field(Field::string("user_pool_id").vendor("UserPoolId"))
        .field(Field::string("identity_pool_id").vendor("IdentityPoolId"))
        .field(Field::string("role_arn").vendor("RoleArn"))
}

fn auto_tune_options() -> Shape {
    let duration = Shape::new()
        .field(Field::int("value").vendor("Value"))
        .field(Field::string("unit").vendor("Unit"));
    let schedule = Shape::new()
        .field(Field::string("start_at").vendor("StartAt"))
        .field(Field::block("duration", duration).vendor("Duration"))
        .field(
            Field::string("cron_expression_for_recurrence")
                .vendor("CronExpressionForRecurrence"),
        );
    Shape::new()
        .field(Field::string("desired_state").vendor("DesiredState"))
        .field(Field::set("maintenance_schedule", schedule).vendor("MaintenanceSchedules"))
        .field(
            Field::string("rollback_on_disable")
                .vendor("RollbackOnDisable")
                .computed(),
        )
}

/// Polling policies. Configuration changes run through the same
/// `processing` phase as creation.
#[must_use]
pub fn lifecycle() -> ResourceLifecycle {
    let settle = || {
        WaitPolicy::new(["active"])
            .failure(["failed"])
            .deadline(Duration::from_secs(60 * 60))
    };
    ResourceLifecycle {
        create: settle(),
        update: settle(),
        delete: WaitPolicy::new([GONE_STATE]).deadline(Duration::from_secs(90 * 60)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::{AttrPath, AttrTree, Scalar, Value};
    use keel_engine::mapper::{expand, flatten, write_only_paths};
    use keel_engine::mock::{CallKind, MockCall, MockVendor};
    use keel_engine::{plan, Applied, ChangeAction, ManualClock, Reconciler};
    use serde_json::json;
    use std::sync::Arc;

    fn ebs(enabled: bool, volume_type: Option<&str>) -> Value {
        let mut block = AttrTree::new().with("ebs_enabled", enabled).with("volume_size", 10_i64);
        if let Some(volume_type) = volume_type {
            block.insert("volume_type", volume_type);
        }
        Value::block(block)
    }

    fn security(password: &str) -> Value {
        Value::block(
            AttrTree::new().with("enabled", true).with(
                "master_user_options",
                Value::block(
                    AttrTree::new()
                        .with("master_user_name", "admin")
                        .with("master_user_password", password),
                ),
            ),
        )
    }

    fn domain() -> AttrTree {
        AttrTree::new()
            .with("domain_name", "logs")
            .with("elasticsearch_version", "7.10")
            .with(
                "cluster_config",
                Value::block(AttrTree::new().with("instance_type", "r5.large.search")),
            )
            .with("ebs_options", ebs(false, None))
            .with("advanced_security_options", security("s3cret"))
            .with("tags", Value::StringMap([("team".to_string(), "search".to_string())].into()))
    }

    #[test]
    fn expand_uses_vendor_names() {
        let request = expand(&domain(), &shape()).unwrap();
        assert_eq!(request["DomainName"], json!("logs"));
        assert_eq!(
            request["ElasticsearchClusterConfig"],
            json!({"InstanceType": "r5.large.search"})
        );
        assert_eq!(
            request["AdvancedSecurityOptions"]["MasterUserOptions"]["MasterUserPassword"],
            json!("s3cret")
        );
        assert_eq!(request["Tags"], json!({"team": "search"}));
    }

    #[test]
    fn enabling_ebs_with_volume_type_replaces() {
        let declared = domain().with("ebs_options", ebs(true, Some("gp3")));
        let plan = plan(&declared, &domain(), &shape());
        assert!(plan.requires_replace());
        assert_eq!(plan.len(), 1);
        assert_eq!(
            plan.changes()[0].path.to_string(),
            "ebs_options.0.volume_type"
        );
    }

    #[test]
    fn enabling_ebs_without_volume_type_is_in_place() {
        let declared = domain().with("ebs_options", ebs(true, None));
        let plan = plan(&declared, &domain(), &shape());
        assert!(!plan.requires_replace());
        assert_eq!(plan.changes()[0].action, ChangeAction::InPlace);
    }

    #[test]
    fn disabling_encryption_replaces() {
        let enc = |enabled: bool| Value::block(AttrTree::new().with("enabled", enabled));
        let remote = domain().with("encrypt_at_rest", enc(true));
        let declared = domain().with("encrypt_at_rest", enc(false));
        assert!(plan(&declared, &remote, &shape()).requires_replace());
    }

    #[test]
    fn hidden_password_is_carried_and_reported() {
        let response = json!({
            "DomainName": "logs",
            "ElasticsearchVersion": "7.10",
            "ElasticsearchClusterConfig": {"InstanceType": "r5.large.search", "InstanceCount": 3},
            "EBSOptions": {"EBSEnabled": false, "VolumeSize": 10},
            "AdvancedSecurityOptions": {
                "Enabled": true,
                "MasterUserOptions": {"MasterUserName": "admin"}
            },
            "AccessPolicies": "{}",
            "Tags": {"team": "search"}
        });
        let remote = flatten(&response, &shape(), Some(&domain())).unwrap();

        assert!(plan(&domain(), &remote, &shape()).is_empty());
        assert_eq!(
            remote
                .block("advanced_security_options")
                .and_then(|b| b.block("master_user_options"))
                .and_then(|b| b.scalar("master_user_password")),
            Some(&Scalar::from("s3cret"))
        );
        assert_eq!(
            write_only_paths(&remote, &shape()),
            vec![AttrPath::root()
                .attr("advanced_security_options")
                .index(0)
                .attr("master_user_options")
                .index(0)
                .attr("master_user_password")]
        );
    }

    #[test]
    fn new_password_is_an_in_place_change() {
        let declared = domain().with("advanced_security_options", security("rotated"));
        let plan = plan(&declared, &domain(), &shape());
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.changes()[0].action, ChangeAction::InPlace);
        assert_eq!(plan.top_level_attributes(), vec!["advanced_security_options"]);
    }

    #[test]
    fn subnet_order_is_not_drift() {
        let vpc = |ids: [&str; 2]| {
            Value::block(AttrTree::new().with("subnet_ids", Value::strings(ids)))
        };
        let declared = domain().with("vpc_options", vpc(["subnet-a", "subnet-b"]));
        let remote = domain().with("vpc_options", vpc(["subnet-b", "subnet-a"]));
        assert!(plan(&declared, &remote, &shape()).is_empty());
    }

    fn cognito() -> Value {
        Value::block(
            AttrTree::new()
                .with("enabled", true)
                .with("user_pool_id", "pool-1")
                .with("identity_pool_id", "identity-1")
                .with("role_arn", "arn:role/search-cognito"),
        )
    }

    fn auto_tune() -> Value {
        let schedule = AttrTree::new()
            .with("start_at", "2026-11-01T00:00:00Z")
            .with(
                "duration",
                Value::block(AttrTree::new().with("value", 2_i64).with("unit", "HOURS")),
            )
            .with("cron_expression_for_recurrence", "cron(0 0 ? * 1 *)");
        Value::block(
            AttrTree::new()
                .with("desired_state", "ENABLED")
                .with("maintenance_schedule", Value::set([schedule])),
        )
    }

    fn updates(vendor: &MockVendor) -> Vec<serde_json::Value> {
        vendor
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                MockCall::Update { request, .. } => Some(serde_json::Value::Object(request)),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn cognito_options_added_and_removed_in_place() {
        let vendor = Arc::new(MockVendor::new());
        let reconciler = Reconciler::new(vendor.clone(), resource_type())
            .with_clock(Arc::new(ManualClock::new()));

        let created = reconciler.reconcile(&domain(), None).await.unwrap();

        let with_cognito = domain().with("cognito_options", cognito());
        let added = reconciler
            .reconcile(&with_cognito, Some(&created.state))
            .await
            .unwrap();
        assert!(matches!(added.applied, Applied::Updated(_)));
        assert_eq!(added.state.identity, created.state.identity);
        assert_eq!(
            added
                .state
                .tree
                .block("cognito_options")
                .and_then(|b| b.scalar("user_pool_id")),
            Some(&Scalar::from("pool-1"))
        );

        let removed = reconciler
            .reconcile(&domain(), Some(&added.state))
            .await
            .unwrap();
        assert!(matches!(removed.applied, Applied::Updated(_)));
        assert!(removed.state.tree.get("cognito_options").is_none());
        assert_eq!(vendor.count(CallKind::Create), 1);
        assert_eq!(vendor.count(CallKind::Delete), 0);

        let requests = updates(&vendor);
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0]["CognitoOptions"]["RoleArn"], json!("arn:role/search-cognito"));
        assert_eq!(requests[1], json!({"CognitoOptions": null}));
    }

    #[test]
    fn auto_tune_schedule_maps_nested_duration() {
        let declared = domain().with("auto_tune_options", auto_tune());
        let request = expand(&declared, &shape()).unwrap();
        assert_eq!(
            request["AutoTuneOptions"],
            json!({
                "DesiredState": "ENABLED",
                "MaintenanceSchedules": [{
                    "StartAt": "2026-11-01T00:00:00Z",
                    "Duration": {"Value": 2, "Unit": "HOURS"},
                    "CronExpressionForRecurrence": "cron(0 0 ? * 1 *)"
                }]
            })
        );

        let mut response = serde_json::Value::Object(request);
        response["AutoTuneOptions"]["RollbackOnDisable"] = json!("NO_ROLLBACK");
        let remote = flatten(&response, &shape(), Some(&declared)).unwrap();
        assert!(plan(&declared, &remote, &shape()).is_empty());
    }

    #[test]
    fn auto_tune_schedule_change_is_in_place() {
        let declared = domain().with("auto_tune_options", auto_tune());
        let disabled = Value::block(AttrTree::new().with("desired_state", "DISABLED"));
        let plan = plan(&domain().with("auto_tune_options", disabled), &declared, &shape());
        assert!(!plan.is_empty());
        assert!(!plan.requires_replace());
        assert_eq!(plan.top_level_attributes(), vec!["auto_tune_options"]);
    }

    #[test]
    fn lifecycle_deadlines() {
        let lifecycle = lifecycle();
        assert_eq!(lifecycle.create.deadline, Duration::from_secs(3600));
        assert_eq!(lifecycle.update.deadline, Duration::from_secs(3600));
        assert_eq!(lifecycle.delete.deadline, Duration::from_secs(5400));
        assert!(lifecycle.create.is_failure("failed"));
        assert!(lifecycle.delete.is_target(GONE_STATE));
        assert!(!lifecycle.create.is_target("processing"));
    }
}
