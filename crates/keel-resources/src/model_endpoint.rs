//! Hosted model inference endpoint.
//!
//! Pointing an endpoint at a new configuration is an update. A failed
//! update rolls back on the vendor side and is reported as `Failed`.

use std::time::Duration;

use keel_core::{Field, Shape};
use keel_engine::{ResourceLifecycle, ResourceType, WaitPolicy, GONE_STATE};

/// Resource type name.
pub const NAME: &str = "model_endpoint";

const DEADLINE: Duration = Duration::from_secs(60 * 60);

/// The model endpoint resource type.
#[must_use]
pub fn resource_type() -> ResourceType {
    ResourceType::new(NAME, shape(), lifecycle())
}

/// Attribute schema.
#[must_use]
pub fn shape() -> Shape {
    Shape::new()
        .field(Field::string("name").vendor("EndpointName").force_replace())
        .field(Field::string("endpoint_config_name").vendor("EndpointConfigName"))
        .field(Field::string_map("tags").vendor("Tags"))
}

/// Polling policies.
#[must_use]
pub fn lifecycle() -> ResourceLifecycle {
    ResourceLifecycle {
        create: WaitPolicy::new(["InService"])
            .failure(["Failed"])
            .deadline(DEADLINE),
        update: WaitPolicy::new(["InService"])
            .failure(["Failed"])
            .deadline(DEADLINE),
        delete: WaitPolicy::new([GONE_STATE])
            .failure(["Failed"])
            .deadline(DEADLINE),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::AttrTree;
    use keel_engine::mock::{CallKind, MockVendor};
    use keel_engine::{Applied, EngineError, ManualClock, OperationKind, Reconciler};
    use std::sync::Arc;

    fn endpoint(config: &str) -> AttrTree {
        AttrTree::new()
            .with("name", "ranker")
            .with("endpoint_config_name", config)
    }

    fn reconciler(vendor: &Arc<MockVendor>) -> Reconciler {
        Reconciler::new(vendor.clone(), resource_type()).with_clock(Arc::new(ManualClock::new()))
    }

    #[tokio::test]
    async fn config_switch_is_an_update() {
        let vendor = Arc::new(MockVendor::new().with_settled_state(NAME, "InService"));
        vendor.script_next(NAME, vec![Ok("Creating".into()), Ok("InService".into())]);
        let reconciler = reconciler(&vendor);

        let created = reconciler.reconcile(&endpoint("cfg-v1"), None).await.unwrap();
        assert_eq!(created.applied, Applied::Created);

        vendor.script_next(NAME, vec![Ok("Updating".into()), Ok("SystemUpdating".into())]);
        let updated = reconciler
            .reconcile(&endpoint("cfg-v2"), Some(&created.state))
            .await
            .unwrap();

        assert!(matches!(updated.applied, Applied::Updated(_)));
        assert_eq!(updated.state.identity, created.state.identity);
        assert_eq!(vendor.count(CallKind::Update), 1);
        assert!(updated.unverified.is_empty());
    }

    #[tokio::test]
    async fn rolled_back_update_fails() {
        let vendor = Arc::new(MockVendor::new().with_settled_state(NAME, "InService"));
        let reconciler = reconciler(&vendor);

        let created = reconciler.reconcile(&endpoint("cfg-v1"), None).await.unwrap();
        vendor.script_next(NAME, vec![Ok("Updating".into()), Ok("Failed".into())]);

        let err = reconciler
            .reconcile(&endpoint("cfg-v2"), Some(&created.state))
            .await
            .unwrap_err();
        assert!(matches!(
            err.error,
            EngineError::TerminalProvisioning {
                operation: OperationKind::Update,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn renaming_replaces() {
        let vendor = Arc::new(MockVendor::new().with_settled_state(NAME, "InService"));
        let reconciler = reconciler(&vendor);

        let created = reconciler.reconcile(&endpoint("cfg-v1"), None).await.unwrap();
        let renamed = endpoint("cfg-v1").with("name", "ranker-v2");
        let outcome = reconciler
            .reconcile(&renamed, Some(&created.state))
            .await
            .unwrap();

        assert_eq!(outcome.applied, Applied::Replaced);
        assert_eq!(vendor.count(CallKind::Delete), 1);
    }
}
