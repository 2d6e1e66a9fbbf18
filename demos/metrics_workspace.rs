//! Metrics workspace - wiring handler groups into a dispatcher.
//!
//! This demo shows:
//! - Building groups with `ActionGroup::with_default_routing`
//! - Scoping by fixed metadata and by call arguments
//! - Forwarding from one action to another with `call.forward()`
//! - Pushing follow-up work onto the shared work queue
//! - Reading channel messages published by handlers
//!
//! ```text
//! RUST_LOG=action_dispatch=debug cargo run --example metrics_workspace
//! ```

use action_dispatch::{
    Action, ActionGroup, ActionsChannel, Dispatcher, EntityStateLookup, EntityStateStore,
    EntityType, RequestContext, StateType,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Body of `addNewMeasure`, second positional argument.
#[derive(Deserialize, Debug)]
struct MeasureInput {
    expression: String,
}

fn measures() -> ActionGroup {
    ActionGroup::with_default_routing("measures")
        .handle(Action::AddNewMeasure, |call| async move {
            let id = call.args().decode::<String>(0)?;
            let input = call.args().decode::<MeasureInput>(1)?;

            call.context()
                .entity_state()
                .put(id.clone(), json!({ "expression": input.expression }))
                .await;
            call.context().notify("measureAdded", json!({ "id": id })).await?;
            Ok(None)
        })
        .handle(Action::ValidateMeasureExpression, |call| async move {
            let expression = call.args().decode::<String>(1)?;
            if expression.matches('(').count() != expression.matches(')').count() {
                anyhow::bail!("unbalanced parentheses in '{expression}'");
            }
            Ok(Some(json!({ "valid": true })))
        })
        .handle(Action::DeleteMeasure, |call| async move {
            let id = call.args().decode::<String>(0)?;
            // Reuse the generic delete so both paths behave the same.
            call.forward(Action::DeleteEntity, vec![json!("MeasureDefinition"), json!(id)])
                .await
                .into_result()
                .map_err(anyhow::Error::from)
        })
}

fn entities() -> ActionGroup {
    ActionGroup::with_default_routing("entities")
        .handle(Action::DeleteEntity, |call| async move {
            let removed = match call.context().entity_id() {
                Some(id) => call.context().entity_state().remove(id).await,
                None => None,
            };
            Ok(Some(json!({ "removed": removed.is_some() })))
        })
        .handle(Action::UpdateEntityField, |call| async move {
            let field = call.args().decode::<String>(3)?;
            let value = call.args().get(4).cloned().unwrap_or_default();
            let Some(id) = call.context().entity_id() else {
                return Ok(None);
            };

            let state = call.context().entity_state();
            let mut entity = state.get(id).await.unwrap_or_else(|| json!({}));
            entity[field.as_str()] = value;
            state.put(id, entity.clone()).await;
            Ok(Some(entity))
        })
}

fn metrics(store: Arc<EntityStateStore>) -> ActionGroup {
    ActionGroup::with_default_routing("metrics").handle(
        Action::GenerateMeasuresAndDimensions,
        move |call| {
            let store = store.clone();
            async move {
                let id = call.args().decode::<String>(0)?;
                call.queue()
                    .enqueue(format!("generate:{id}"), async move {
                        let derived =
                            store.entity_state(EntityType::MetricsDefinition, Some(StateType::Derived))?;
                        derived.put(id, json!({ "measures": 1, "dimensions": 0 })).await;
                        Ok(())
                    })
                    .await?;
                Ok(None)
            }
        },
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let store = Arc::new(EntityStateStore::new());
    let dispatcher = Dispatcher::builder(store.clone())
        .groups([measures(), entities(), metrics(store.clone())])
        .build()?;

    let (channel, mut rx) = ActionsChannel::new(16);
    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            println!("event {} {}", message.event, message.payload);
        }
    });
    let ctx = RequestContext::new(channel);

    let calls = [
        (Action::AddNewMeasure, vec![json!("revenue"), json!({ "expression": "sum(amount)" })]),
        (Action::ValidateMeasureExpression, vec![json!("revenue"), json!("sum(amount")]),
        (
            Action::UpdateEntityField,
            vec![json!("MeasureDefinition"), json!("Persistent"), json!("revenue"), json!("label"), json!("Revenue")],
        ),
        (Action::GenerateMeasuresAndDimensions, vec![json!("sales")]),
        (Action::DeleteMeasure, vec![json!("revenue")]),
    ];

    for (action, args) in calls {
        let response = dispatcher.dispatch(&ctx, action, args).await;
        println!("{action}: {}", serde_json::to_string(&response)?);
    }

    let response = dispatcher.dispatch_named(&ctx, "doTheImpossible", Vec::<serde_json::Value>::new()).await;
    println!("doTheImpossible: {}", serde_json::to_string(&response)?);

    // Wait for queued work before reading derived state.
    dispatcher.queue().submit("flush", async { Ok(()) }).await?.wait().await?;
    let derived = store.entity_state(EntityType::MetricsDefinition, Some(StateType::Derived))?;
    println!("derived sales: {:?}", derived.get("sales").await);

    Ok(())
}
