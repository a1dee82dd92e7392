//! Streaming calls relayed from the daemon to an app.

mod common;

use common::{eventually, install_app, launcher, user};
use mainframe_launcher::AppWindow;
use serde_json::json;

#[tokio::test]
async fn topic_items_reach_the_app() {
    let l = launcher().await;
    let app = install_app(&l.daemon, "chat", &[], false);
    let context = l.registry.launch(&app, &user("bob")).await.unwrap();
    let channel = l.windows.last().unwrap().channel().unwrap();

    let mut subscription = channel
        .subscribe("pss_createTopicSubscription", json!({ "topic": "0x01" }))
        .await
        .unwrap();
    assert!(!subscription.handle().is_empty());
    assert_eq!(context.channel().subscriptions().len(), 1);

    let backends = l.daemon.backends.clone();
    eventually(|| {
        let backends = backends.clone();
        async move { backends.live_topic_subscriptions() == 1 }
    })
    .await;

    assert_eq!(l.daemon.backends.publish(json!({ "message": "hi" })), 1);
    let item = subscription.next().await.unwrap();
    assert_eq!(item, json!({ "message": "hi" }));
}

#[tokio::test]
async fn unsubscribing_leaves_nothing_behind() {
    let l = launcher().await;
    let app = install_app(&l.daemon, "chat", &[], false);
    let context = l.registry.launch(&app, &user("bob")).await.unwrap();
    let channel = l.windows.last().unwrap().channel().unwrap();

    let subscription = channel
        .subscribe("pss_createTopicSubscription", json!({ "topic": "0x01" }))
        .await
        .unwrap();
    subscription.unsubscribe().await.unwrap();

    assert!(context.channel().subscriptions().is_empty());
    let backends = l.daemon.backends.clone();
    eventually(|| {
        let backends = backends.clone();
        async move { backends.live_topic_subscriptions() == 0 }
    })
    .await;
    assert_eq!(l.daemon.backends.publish(json!("late")), 0);
}

#[tokio::test]
async fn dropping_a_subscription_releases_it() {
    let l = launcher().await;
    let app = install_app(&l.daemon, "chat", &[], false);
    let context = l.registry.launch(&app, &user("bob")).await.unwrap();
    let channel = l.windows.last().unwrap().channel().unwrap();

    let subscription = channel
        .subscribe("pss_createTopicSubscription", json!({}))
        .await
        .unwrap();
    drop(subscription);

    let relay = context.channel().subscriptions().clone();
    eventually(|| {
        let relay = relay.clone();
        async move { relay.is_empty() }
    })
    .await;
    let backends = l.daemon.backends.clone();
    eventually(|| {
        let backends = backends.clone();
        async move { backends.live_topic_subscriptions() == 0 }
    })
    .await;
}

#[tokio::test]
async fn closing_the_window_ends_its_streams() {
    let l = launcher().await;
    let app = install_app(&l.daemon, "chat", &[], false);
    l.registry.launch(&app, &user("bob")).await.unwrap();
    let window = l.windows.last().unwrap();
    let channel = window.channel().unwrap();

    let mut subscription = channel
        .subscribe("pss_createTopicSubscription", json!({}))
        .await
        .unwrap();

    l.registry.window_closed(window.id()).await.unwrap();
    assert_eq!(subscription.next().await, None);

    let backends = l.daemon.backends.clone();
    eventually(|| {
        let backends = backends.clone();
        async move { backends.live_topic_subscriptions() == 0 }
    })
    .await;
}
