//! Session replacement, disposal, and registry routing.

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use common::{RecordingUi, ScriptEvent, ScriptedBridge, StaticHistory, Turn, wait_until};
use skiff::config::BridgeConfig;
use skiff::registry::ControllerRegistry;
use skiff::settings::MemorySettings;
use skiff::WindowController;
use skiff_protocol::PermissionDecision;

async fn build(
    turns: Vec<Turn>,
) -> (Arc<WindowController>, Arc<ScriptedBridge>, Arc<RecordingUi>) {
    let bridge = ScriptedBridge::new(turns);
    let codex = ScriptedBridge::new(Vec::new());
    let ui = RecordingUi::new();
    let config = BridgeConfig {
        project_path: Some(std::env::temp_dir()),
        interrupt_timeout: Duration::from_secs(2),
        ..BridgeConfig::default()
    };
    let controller = WindowController::with_bridges(
        "test-project",
        config,
        Arc::new(MemorySettings::new()),
        StaticHistory::with_messages(Vec::new()),
        ui.clone(),
        bridge.clone(),
        codex,
    )
    .await;
    (controller, bridge, ui)
}

#[tokio::test]
async fn replacement_interrupts_the_outgoing_session_first() {
    let turns = vec![Turn::Hang {
        events: Vec::new(),
        on_interrupt: Vec::new(),
    }];
    let (controller, bridge, ui) = build(turns).await;

    controller.handle_ui_event("send_message:working").await;
    wait_until("session busy", || controller.context().session().is_busy()).await;
    let old_instance = controller.context().session().instance();

    controller.create_new_session().await.unwrap();

    // outgoing session was cancelled, and exactly once
    assert_eq!(bridge.interrupts.load(Ordering::SeqCst), 1);

    let session = controller.context().session();
    assert_ne!(session.instance(), old_instance);
    assert!(!session.is_busy());
    assert!(session.session_id().is_none());

    assert!(ui.count("clearMessages") >= 1);
    assert!(
        ui.last_arg("updateStatus")
            .unwrap()
            .contains("new session ready")
    );
    // usage resets with the replacement (arguments arrive JSON-escaped)
    let usage = ui.last_arg("onUsageUpdate").unwrap();
    assert!(usage.contains(r#"used_tokens\":0"#), "unexpected reset: {usage}");
}

#[tokio::test]
async fn no_callbacks_from_a_superseded_session_after_installation() {
    let turns = vec![
        Turn::Hang {
            events: vec![ScriptEvent::Assistant {
                content: "EARLY".to_string(),
                usage: None,
            }],
            // Late backend output racing the cancellation.
            on_interrupt: vec![ScriptEvent::Assistant {
                content: "LATE".to_string(),
                usage: None,
            }],
        },
        Turn::Complete {
            events: vec![ScriptEvent::Assistant {
                content: "FRESH".to_string(),
                usage: None,
            }],
            error: None,
        },
    ];
    let (controller, _bridge, ui) = build(turns).await;

    controller.handle_ui_event("send_message:go").await;
    wait_until("first turn streaming", || {
        ui.last_arg("updateMessages")
            .is_some_and(|arg| arg.contains("EARLY"))
    })
    .await;

    controller.create_new_session().await.unwrap();
    let installed_at = ui
        .calls()
        .iter()
        .rposition(|(name, args)| {
            name == "updateStatus" && args[0].contains("new session ready")
        })
        .expect("installation marker");

    controller.handle_ui_event("send_message:again").await;
    wait_until("second turn streaming", || {
        ui.last_arg("updateMessages")
            .is_some_and(|arg| arg.contains("FRESH"))
    })
    .await;

    // Nothing attributable to the superseded session may arrive after the
    // new session was installed.
    let calls = ui.calls();
    let leaked = calls[installed_at..].iter().any(|(name, args)| {
        name == "updateMessages" && args.iter().any(|arg| arg.contains("LATE"))
    });
    assert!(!leaked, "superseded session leaked a transcript update");
}

#[tokio::test]
async fn disposal_is_idempotent_and_gates_everything() {
    let turns = vec![Turn::Hang {
        events: vec![ScriptEvent::Permission {
            id: "pending".to_string(),
            tool: "Bash".to_string(),
        }],
        on_interrupt: Vec::new(),
    }];
    let (controller, bridge, ui) = build(turns).await;

    controller.handle_ui_event("send_message:work").await;
    wait_until("permission prompt", || {
        ui.count("showPermissionRequest") == 1
    })
    .await;

    controller.dispose().await;
    controller.dispose().await; // second call is a no-op

    assert!(controller.is_disposed());
    // the in-flight turn was wound down once
    assert_eq!(bridge.interrupts.load(Ordering::SeqCst), 1);

    // the pending permission resolved to the default denial
    wait_until("default denial", || {
        !bridge.decisions.lock().unwrap().is_empty()
    })
    .await;
    assert_eq!(
        bridge.decisions.lock().unwrap().clone(),
        vec![("pending".to_string(), PermissionDecision::Deny)]
    );

    // everything after disposal is a no-op, not an error
    let before = ui.calls().len();
    controller.handle_ui_event("send_message:ignored").await;
    controller.push_selection("ignored selection");
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(ui.calls().len(), before);
    assert_eq!(bridge.sends.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn registry_supersedes_duplicate_windows_and_routes_calls() {
    let registry = ControllerRegistry::new();

    let (first, _, _) = build(Vec::new()).await;
    let (second, _, second_ui) = build(Vec::new()).await;

    registry.insert(Arc::clone(&first));
    registry.insert(Arc::clone(&second));
    assert_eq!(registry.len(), 1);

    // the superseded window gets disposed in the background
    wait_until("old window disposed", || first.is_disposed()).await;
    assert!(!second.is_disposed());

    registry.push_selection("test-project", "fn main() {}");
    wait_until("selection routed", || {
        second_ui.count("addSelectionInfo") == 1
    })
    .await;

    // unknown projects are dropped quietly
    registry.push_selection("other-project", "ignored");

    registry.dispose_all().await;
    assert!(registry.is_empty());
    assert!(second.is_disposed());
}

#[tokio::test]
async fn new_session_command_reaches_the_reserved_fallback() {
    let (controller, _bridge, ui) = build(Vec::new()).await;
    let old_instance = controller.context().session().instance();

    // no registered handler claims this tag; the controller's fallback does
    controller.handle_ui_event("create_new_session").await;

    wait_until("replacement installed", || {
        controller.context().session().instance() != old_instance
    })
    .await;
    assert!(
        ui.last_arg("updateStatus")
            .unwrap()
            .contains("new session ready")
    );
}

#[tokio::test]
async fn session_load_requests_route_through_the_registry() {
    let registry = ControllerRegistry::new();
    let (controller, _, _ui) = build(Vec::new()).await;
    registry.insert(Arc::clone(&controller));

    assert!(registry.request_session_load("test-project", "sess-42", None));
    wait_until("session swapped in", || {
        controller.context().session().session_id().as_deref() == Some("sess-42")
    })
    .await;

    assert!(!registry.request_session_load("missing-project", "sess-1", None));
}
