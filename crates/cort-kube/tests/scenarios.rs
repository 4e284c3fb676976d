//! End-to-end passes: generation, reconciliation and status aggregation

use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;

use cort_core::{
    ComponentResource, ComponentStatus, CoreError, Parameters, Phase, PhaseEvent, State,
    digest_object,
};
use cort_engine::{
    EngineError, Generator, KustomizeGenerator, SourceTree, TemplateGenerator, TemplateSet,
    VirtualFs,
};
use cort_kube::{ActionKind, ComponentPass, InventoryReconciler};

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap()
}

fn config_map(name: &str) -> String {
    format!(
        "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: {name}\n  namespace: {{{{ deployment_namespace() }}}}\ndata:\n  env: {{{{ env }}}}\n"
    )
}

fn templates(names: &[&str]) -> TemplateGenerator {
    let mut set = TemplateSet::new();
    for name in names {
        set.add(format!("{}.yaml", name), config_map(name));
    }
    TemplateGenerator::new(
        SourceTree {
            templates: set,
            statics: VirtualFs::new(),
        },
        None,
    )
}

fn shop(values: serde_json::Value) -> ComponentResource {
    let parameters = Parameters::from_serialize(&values).unwrap();
    ComponentResource::new("apps", "shop").with_values(&parameters)
}

/// Stand-in for the external applier: confirms every pending apply and delete
fn apply_all(status: &mut ComponentStatus) {
    for item in &mut status.inventory {
        match item.phase {
            Phase::ScheduledForApplication | Phase::Creating | Phase::Updating => {
                let created = item.phase == Phase::ScheduledForApplication;
                item.advance(PhaseEvent::ApplyStarted { created }).unwrap();
                item.advance(PhaseEvent::ApplyConfirmed).unwrap();
            }
            Phase::ScheduledForDeletion | Phase::Deleting => {
                item.advance(PhaseEvent::DeleteStarted).unwrap();
                item.advance(PhaseEvent::DeleteConfirmed).unwrap();
            }
            _ => {}
        }
    }
}

fn phases(status: &ComponentStatus) -> Vec<(String, Phase)> {
    status
        .inventory
        .iter()
        .map(|item| (item.name_info.name.clone(), item.phase))
        .collect()
}

#[test]
fn test_scenario_rendered_config_map() {
    let generator = TemplateGenerator::new(
        SourceTree {
            templates: TemplateSet::new().with(
                "cm.yaml",
                "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: settings\n  namespace: {{ deployment_namespace() }}\ndata:\n  foo: {{ env }}\n",
            ),
            statics: VirtualFs::new(),
        },
        None,
    );

    let outcome = ComponentPass::new().run(&generator, &shop(json!({"env": "prod"})), at(1));

    assert!(outcome.is_ok());
    assert_eq!(outcome.objects.len(), 1);
    let object = &outcome.objects[0];
    assert_eq!(object.key().namespace, "apps");
    assert_eq!(object.body().pointer("/data/foo"), Some(&json!("prod")));
    assert_eq!(outcome.status.inventory[0].phase, Phase::ScheduledForApplication);
}

#[test]
fn test_scenario_removed_template_is_scheduled_for_deletion() {
    let pass = ComponentPass::new();
    let mut component = shop(json!({"env": "prod"}));

    component.status = pass.run(&templates(&["a", "b"]), &component, at(1)).status;
    apply_all(&mut component.status);
    let digest_a = component.status.inventory[0].digest.clone();

    let outcome = pass.run(&templates(&["a"]), &component, at(2));

    assert_eq!(
        phases(&outcome.status),
        vec![
            ("a".to_string(), Phase::Ready),
            ("b".to_string(), Phase::ScheduledForDeletion),
        ]
    );
    assert_eq!(outcome.status.inventory[0].digest, digest_a);
    let actions = outcome
        .actions
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n");
    insta::assert_snapshot!(actions, @"delete v1/ConfigMap apps/b");
}

#[test]
fn test_scenario_changed_body_updates_until_confirmed() {
    let mut statics = VirtualFs::new();
    statics
        .write(
            "kustomization.yaml",
            "resources:\n  - deployment.yaml\ncommonLabels:\n  app.kubernetes.io/part-of: shop\n",
        )
        .unwrap();
    let generator = KustomizeGenerator::new(
        SourceTree {
            templates: TemplateSet::new().with(
                "deployment.yaml",
                "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: {{ deployment_name() }}\n  namespace: {{ deployment_namespace() }}\nspec:\n  replicas: {{ replicas }}\n  selector:\n    matchLabels:\n      app: web\n  template:\n    metadata:\n      labels:\n        app: web\n    spec:\n      containers:\n        - name: web\n          image: nginx\n",
            ),
            statics,
        },
        None,
    );
    let pass = ComponentPass::new();

    let mut component = shop(json!({"replicas": 2}));
    component.status = pass.run(&generator, &component, at(1)).status;
    apply_all(&mut component.status);
    component.status = pass.run(&generator, &component, at(2)).status;
    assert_eq!(component.status.state, State::Ready);
    assert_eq!(component.status.applied_generation, 1);
    let old_digest = component.status.inventory[0].digest.clone();

    let status = component.status.clone();
    component = shop(json!({"replicas": 3}));
    component.metadata.generation = 2;
    component.status = status;

    let outcome = pass.run(&generator, &component, at(3));
    let item = &outcome.status.inventory[0];
    assert_eq!(item.phase, Phase::Updating);
    assert_ne!(item.digest, old_digest);
    assert_eq!(outcome.objects[0].body().pointer("/spec/replicas"), Some(&json!(3)));
    assert_eq!(
        outcome.objects[0]
            .body()
            .pointer("/spec/selector/matchLabels/app.kubernetes.io~1part-of"),
        Some(&json!("shop"))
    );
    assert_eq!(outcome.status.observed_generation, 2);
    assert_eq!(outcome.status.applied_generation, 1);
    assert_eq!(outcome.status.state, State::Processing);
    assert_eq!(outcome.actions[0].kind, ActionKind::Update);

    component.status = outcome.status;
    apply_all(&mut component.status);
    let outcome = pass.run(&generator, &component, at(4));
    assert_eq!(outcome.status.applied_generation, 2);
    assert_eq!(outcome.status.state, State::Ready);
}

#[test]
fn test_generation_is_idempotent() {
    let generator = templates(&["a", "b"]);
    let parameters = Parameters::from_serialize(&json!({"env": "prod"})).unwrap();

    let first = generator.generate("apps", "shop", &parameters).unwrap();
    let second = generator.generate("apps", "shop", &parameters).unwrap();

    assert_eq!(first, second);
    for (a, b) in first.iter().zip(&second) {
        assert_eq!(digest_object(a).unwrap(), digest_object(b).unwrap());
    }
}

#[test]
fn test_digest_ignores_key_order() {
    let a = cort_core::DecodedObject::from_value(json!({
        "apiVersion": "v1", "kind": "ConfigMap",
        "metadata": {"name": "a", "namespace": "apps"},
        "data": {"x": "1", "y": "2"}
    }))
    .unwrap();
    let b = cort_core::DecodedObject::from_value(json!({
        "data": {"y": "2", "x": "1"},
        "metadata": {"namespace": "apps", "name": "a"},
        "kind": "ConfigMap", "apiVersion": "v1"
    }))
    .unwrap();
    let c = cort_core::DecodedObject::from_value(json!({
        "apiVersion": "v1", "kind": "ConfigMap",
        "metadata": {"name": "a", "namespace": "apps"},
        "data": {"x": "1", "y": "3"}
    }))
    .unwrap();

    assert_eq!(digest_object(&a).unwrap(), digest_object(&b).unwrap());
    assert_ne!(digest_object(&a).unwrap(), digest_object(&c).unwrap());
}

#[test]
fn test_removed_object_is_recreated_only_after_purge() {
    let pass = ComponentPass::new();
    let mut component = shop(json!({"env": "prod"}));

    component.status = pass.run(&templates(&["a", "b"]), &component, at(1)).status;
    apply_all(&mut component.status);
    component.status = pass.run(&templates(&["a"]), &component, at(2)).status;

    // delete issued but not yet confirmed
    component.status.inventory[1]
        .advance(PhaseEvent::DeleteStarted)
        .unwrap();
    component.status = pass.run(&templates(&["a", "b"]), &component, at(3)).status;
    assert_eq!(component.status.inventory[1].phase, Phase::Deleting);

    component.status.inventory[1]
        .advance(PhaseEvent::DeleteConfirmed)
        .unwrap();
    assert_eq!(component.status.inventory[1].phase, Phase::Completed);

    let outcome = pass.run(&templates(&["a", "b"]), &component, at(4));
    assert_eq!(
        phases(&outcome.status),
        vec![
            ("a".to_string(), Phase::Ready),
            ("b".to_string(), Phase::ScheduledForApplication),
        ]
    );
    let kinds: Vec<_> = outcome.actions.iter().map(|a| a.kind).collect();
    assert_eq!(kinds, vec![ActionKind::Purge, ActionKind::Create]);
}

#[test]
fn test_active_items_match_desired_set() {
    let reconciler = InventoryReconciler::new();
    let parameters = Parameters::from_serialize(&json!({"env": "prod"})).unwrap();
    let mut inventory = Vec::new();

    let passes: [&[&str]; 4] = [&["a", "b", "c"], &["b", "d"], &["a", "d", "e"], &[]];
    for names in passes {
        let desired = templates(names).generate("apps", "shop", &parameters).unwrap();
        inventory = reconciler.reconcile(&inventory, &desired).unwrap().inventory;

        let mut active: Vec<_> = inventory
            .iter()
            .filter(|item| item.phase.is_active())
            .map(|item| item.key())
            .collect();
        let mut expected: Vec<_> = desired.iter().map(|o| o.key().clone()).collect();
        active.sort();
        expected.sort();
        assert_eq!(active, expected, "desired {:?}", names);

        let mut status = ComponentStatus {
            inventory,
            ..ComponentStatus::default()
        };
        apply_all(&mut status);
        inventory = status.inventory;
    }
}

#[test]
fn test_no_item_dropped_before_confirmed_deletion() {
    let reconciler = InventoryReconciler::new();
    let parameters = Parameters::from_serialize(&json!({"env": "prod"})).unwrap();
    let desired = templates(&["a", "b"]).generate("apps", "shop", &parameters).unwrap();

    let first = reconciler.reconcile(&[], &desired).unwrap().inventory;
    let second = reconciler.reconcile(&first, &[]).unwrap().inventory;
    assert_eq!(second.len(), 2);
    assert!(second.iter().all(|i| i.phase == Phase::ScheduledForDeletion));

    let third = reconciler.reconcile(&second, &[]).unwrap().inventory;
    assert_eq!(third, second);
}

#[test]
fn test_duplicate_documents_fail_the_pass() {
    let generator = TemplateGenerator::new(
        SourceTree {
            templates: TemplateSet::new()
                .with("one.yaml", config_map("same"))
                .with("two.yaml", config_map("same")),
            statics: VirtualFs::new(),
        },
        None,
    );
    let parameters = Parameters::from_serialize(&json!({"env": "prod"})).unwrap();

    let err = generator.generate("apps", "shop", &parameters).unwrap_err();
    assert!(matches!(
        err,
        EngineError::Core(CoreError::DuplicateObject { .. })
    ));

    let outcome = ComponentPass::new().run(&generator, &shop(json!({"env": "prod"})), at(1));
    assert_eq!(outcome.status.state, State::Error);
    assert!(outcome.status.inventory.is_empty());
    assert!(
        outcome
            .status
            .ready_condition()
            .unwrap()
            .message
            .contains("duplicate object v1/ConfigMap apps/same")
    );
}

#[test]
fn test_status_survives_persistence() {
    let pass = ComponentPass::new();
    let mut component = shop(json!({"env": "prod"}));
    component.status = pass.run(&templates(&["a"]), &component, at(1)).status;

    let yaml = serde_yaml::to_string(&component).unwrap();
    let restored = ComponentResource::from_yaml(&yaml).unwrap();
    assert_eq!(restored.status, component.status);

    let outcome = pass.run(&templates(&["a"]), &restored, at(2));
    assert_eq!(outcome.status.inventory, component.status.inventory);
}
