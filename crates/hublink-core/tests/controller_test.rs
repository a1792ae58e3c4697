#![allow(clippy::unwrap_used)]

mod common;

use std::time::Duration;

use pretty_assertions::assert_eq;
use secrecy::SecretString;
use url::Url;

use common::{FakeHub, TOKEN, wait_until};
use hublink_core::{
    CommandOutcome, ConnectionStatus, Controller, CoreError, HubConfig, MediaAction,
    MediaSendOutcome, ResyncSignal,
};

async fn connected(hub: &FakeHub) -> Controller {
    let controller = Controller::new(hub.config(TOKEN));
    controller.connect().await.unwrap();
    controller
}

fn state_of(controller: &Controller, entity_id: &str) -> String {
    controller.entity(entity_id).unwrap().state.clone()
}

fn position(requests: &[String], kind: &str) -> usize {
    requests
        .iter()
        .position(|r| r == kind)
        .unwrap_or_else(|| panic!("no {kind} in {requests:?}"))
}

fn assert_send<T: Send>(_: &T) {}

#[test]
fn test_lifecycle_futures_are_send() {
    let config = HubConfig::new(
        Url::parse("http://127.0.0.1:9").unwrap(),
        SecretString::from("t"),
    );
    let controller = Controller::new(config);
    let connect = controller.connect();
    let resync = controller.resync();
    assert_send(&connect);
    assert_send(&resync);
}

#[tokio::test]
async fn test_connect_loads_snapshot_and_follows_events() {
    let hub = FakeHub::start(&[("light.kitchen", "off"), ("sensor.outdoor", "12.5")]).await;
    let controller = connected(&hub).await;

    assert_eq!(controller.connection_status(), ConnectionStatus::Connected);
    assert_eq!(controller.entities_snapshot().len(), 2);
    assert_eq!(hub.subscriptions(), 1);
    assert!(controller.store().last_full_refresh().is_some());

    let mut changes = controller.state_changes();
    hub.push_state("sensor.outdoor", "13.0");
    let change = tokio::time::timeout(Duration::from_secs(5), changes.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(change.entity_id.as_str(), "sensor.outdoor");
    assert_eq!(state_of(&controller, "sensor.outdoor"), "13.0");
    assert!(controller.store().last_event_at().is_some());

    controller.disconnect().await;
    assert_eq!(controller.connection_status(), ConnectionStatus::Disconnected);
}

#[tokio::test]
async fn test_toggle_is_confirmed_by_hub_event() {
    let hub = FakeHub::start(&[("light.kitchen", "off")]).await;
    let controller = connected(&hub).await;

    let outcome = controller.toggle_entity("light.kitchen").await.unwrap();
    assert_eq!(state_of(&controller, "light.kitchen"), "on");

    let calls = hub.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0]["domain"], "light");
    assert_eq!(calls[0]["service"], "turn_on");
    assert_eq!(calls[0]["service_data"]["entity_id"], "light.kitchen");

    hub.push_state("light.kitchen", "on");
    let CommandOutcome::Optimistic(receipt) = outcome else {
        panic!("light toggles are optimistic");
    };
    let action = receipt.confirmed().await.unwrap();
    assert_eq!(action.target_state, "on");

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(state_of(&controller, "light.kitchen"), "on");
    controller.disconnect().await;
}

#[tokio::test]
async fn test_toggle_rolls_back_without_confirmation() {
    let hub = FakeHub::start(&[("switch.heater", "on")]).await;
    let controller = connected(&hub).await;

    let outcome = controller.toggle_entity("switch.heater").await.unwrap();
    assert_eq!(state_of(&controller, "switch.heater"), "off");

    let CommandOutcome::Optimistic(receipt) = outcome else {
        panic!("switch toggles are optimistic");
    };
    assert!(matches!(
        receipt.confirmed().await,
        Err(CoreError::ConfirmationTimeout { .. })
    ));
    assert_eq!(state_of(&controller, "switch.heater"), "on");
    assert_eq!(controller.dispatcher().pending_count(), 0);
    controller.disconnect().await;
}

#[tokio::test]
async fn test_reconnect_resyncs_and_clears_pending() {
    let hub = FakeHub::start(&[("light.porch", "off")]).await;
    let controller = connected(&hub).await;

    controller.toggle_entity("light.porch").await.unwrap();
    assert_eq!(controller.dispatcher().pending_count(), 1);

    hub.set_state("light.porch", "unavailable");
    hub.drop_connection();

    wait_until("second snapshot", || hub.snapshots() >= 2).await;
    wait_until("resubscription", || hub.subscriptions() >= 2).await;
    wait_until("resynced state", || {
        controller
            .entity("light.porch")
            .is_some_and(|e| e.state == "unavailable")
    })
    .await;

    assert_eq!(hub.connections(), 2);
    assert_eq!(controller.dispatcher().pending_count(), 0);
    assert_eq!(controller.connection_status(), ConnectionStatus::Connected);

    // Events keep flowing on the new socket.
    hub.push_state("light.porch", "on");
    wait_until("event after reconnect", || {
        controller
            .entity("light.porch")
            .is_some_and(|e| e.state == "on")
    })
    .await;
    controller.disconnect().await;
}

#[tokio::test]
async fn test_reconnect_listens_before_snapshot() {
    let hub = FakeHub::start(&[("light.porch", "off")]).await;
    let controller = connected(&hub).await;

    let first = hub.requests_on(0);
    assert!(position(&first, "subscribe_events") < position(&first, "get_states"));

    hub.drop_connection();
    wait_until("second snapshot", || hub.snapshots() >= 2).await;

    let second = hub.requests_on(1);
    assert!(
        position(&second, "subscribe_events") < position(&second, "get_states"),
        "resubscribe must precede the snapshot: {second:?}"
    );
    controller.disconnect().await;
}

#[tokio::test]
async fn test_refused_subscription_fails_connect() {
    let hub = FakeHub::start(&[("light.a", "off")]).await;
    hub.refuse_subscriptions(true);
    let controller = Controller::new(hub.config(TOKEN));

    let err = controller.connect().await.unwrap_err();
    assert!(matches!(err, CoreError::Hub { .. }), "got {err:?}");
    assert_eq!(controller.connection_status(), ConnectionStatus::Disconnected);
    assert!(controller.store().last_error().is_some());
    assert_eq!(hub.snapshots(), 0);
}

#[tokio::test]
async fn test_refused_resubscribe_is_retried_by_resync() {
    let hub = FakeHub::start(&[("light.porch", "off")]).await;
    let controller = connected(&hub).await;

    hub.refuse_subscriptions(true);
    hub.drop_connection();
    wait_until("second snapshot", || hub.snapshots() >= 2).await;
    wait_until("error recorded", || controller.store().last_error().is_some()).await;
    assert_eq!(hub.subscriptions(), 1);

    hub.refuse_subscriptions(false);
    controller.resync().await.unwrap();
    assert_eq!(hub.subscriptions(), 2);
    assert!(controller.store().last_error().is_none());

    hub.push_state("light.porch", "on");
    wait_until("event after retry", || {
        controller
            .entity("light.porch")
            .is_some_and(|e| e.state == "on")
    })
    .await;
    controller.disconnect().await;
}

#[tokio::test]
async fn test_normal_close_is_final() {
    let hub = FakeHub::start(&[("light.a", "off")]).await;
    let controller = connected(&hub).await;

    hub.close_normal();
    wait_until("disconnected", || {
        controller.connection_status() == ConnectionStatus::Disconnected
    })
    .await;
    assert!(controller.store().last_error().is_some());

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(hub.connections(), 1);
    assert!(matches!(
        controller.toggle_entity("light.a").await,
        Err(CoreError::NotConnected)
    ));
    controller.disconnect().await;
}

#[tokio::test]
async fn test_resync_after_close_reconnects() {
    let hub = FakeHub::start(&[("light.a", "off")]).await;
    let controller = connected(&hub).await;

    hub.close_normal();
    wait_until("disconnected", || {
        controller.connection_status() == ConnectionStatus::Disconnected
    })
    .await;

    controller.resync().await.unwrap();
    assert_eq!(hub.connections(), 2);
    assert_eq!(controller.connection_status(), ConnectionStatus::Connected);
    assert!(controller.store().last_error().is_none());
    controller.disconnect().await;
}

#[tokio::test]
async fn test_resync_signal_reconnects_after_close() {
    let hub = FakeHub::start(&[("light.a", "off")]).await;
    let controller = connected(&hub).await;

    hub.close_normal();
    wait_until("disconnected", || {
        controller.connection_status() == ConnectionStatus::Disconnected
    })
    .await;

    controller.resync_trigger().fire(ResyncSignal::NetworkOnline);
    wait_until("reconnected", || {
        controller.connection_status() == ConnectionStatus::Connected
    })
    .await;
    assert_eq!(hub.connections(), 2);

    hub.push_state("light.a", "on");
    wait_until("event on new session", || state_of(&controller, "light.a") == "on").await;
    controller.disconnect().await;
}

#[tokio::test]
async fn test_resync_signals_are_debounced() {
    let hub = FakeHub::start(&[("light.a", "off")]).await;
    let controller = connected(&hub).await;
    let trigger = controller.resync_trigger();

    trigger.fire(ResyncSignal::Foreground);
    wait_until("resync snapshot", || hub.snapshots() == 2).await;

    trigger.fire(ResyncSignal::NetworkOnline);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(hub.snapshots(), 2);

    trigger.fire(ResyncSignal::Manual);
    wait_until("manual resync", || hub.snapshots() == 3).await;
    controller.disconnect().await;
}

#[tokio::test]
async fn test_bad_token_fails_connect() {
    let hub = FakeHub::start(&[]).await;
    let controller = Controller::new(hub.config("wrong-token"));

    let err = controller.connect().await.unwrap_err();
    assert!(matches!(err, CoreError::AuthenticationFailed { .. }));
    assert_eq!(controller.connection_status(), ConnectionStatus::Disconnected);
    assert!(controller.store().last_error().is_some());
}

#[tokio::test]
async fn test_media_transport_goes_through_single_flight() {
    let hub = FakeHub::start(&[("media_player.den", "paused")]).await;
    let controller = connected(&hub).await;

    assert_eq!(
        controller
            .media_action("media_player.den", MediaAction::Play)
            .await
            .unwrap(),
        MediaSendOutcome::Sent
    );
    assert_eq!(
        controller
            .media_action("media_player.den", MediaAction::Play)
            .await
            .unwrap(),
        MediaSendOutcome::AlreadyInFlight
    );

    hub.push_state("media_player.den", "playing");
    wait_until("play confirmed", || {
        !controller.media().is_in_flight("media_player.den")
    })
    .await;

    let calls = hub.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0]["service"], "media_play");
    controller.disconnect().await;
}

#[tokio::test]
async fn test_oneshot_runs_and_disconnects() {
    let hub = FakeHub::start(&[("light.a", "on"), ("light.b", "off")]).await;

    let count = Controller::oneshot(hub.config(TOKEN), |controller| async move {
        Ok(controller.entities_snapshot().len())
    })
    .await
    .unwrap();
    assert_eq!(count, 2);
}
