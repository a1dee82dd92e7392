//! Outbound request enforcement for render surfaces.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{install_app, launcher, launcher_with, user};
use mainframe_launcher::{AppWindow, PromptDecision, RenderSurface, RequestVerdict};
use mainframe_permissions::{Evaluation, PermissionCheck};
use mainframe_test::{MockPrompt, MockSurface, MockWindowFactory};

#[tokio::test]
async fn surfaces_get_a_guard_only_once_attached() {
    let l = launcher().await;
    let app = install_app(&l.daemon, "feed", &["api.example.com"], false);
    let context = l.registry.launch(&app, &user("bob")).await.unwrap();
    let window = l.windows.last().unwrap();

    let surface = MockSurface::new();
    assert!(!surface.has_guard());
    assert!(l.registry.context_for_surface(surface.id()).is_none());

    l.registry
        .surface_attached(window.id(), surface.clone())
        .unwrap();
    assert!(surface.has_guard());
    assert_eq!(context.surface_id(), Some(surface.id()));
    assert!(Arc::ptr_eq(
        &l.registry.context_for_surface(surface.id()).unwrap(),
        &context
    ));
}

#[tokio::test]
async fn no_grant_and_no_answer_denies() {
    let l = launcher().await;
    let app = install_app(&l.daemon, "feed", &["api.example.com"], false);
    l.registry.launch(&app, &user("bob")).await.unwrap();
    let surface = MockSurface::new();
    l.registry
        .surface_attached(l.windows.last().unwrap().id(), surface.clone())
        .unwrap();

    let verdict = surface.fetch("https://api.example.com/items").await;
    assert_eq!(verdict, RequestVerdict::Deny);
    assert!(surface.sent().is_empty());
    assert_eq!(l.prompt.ask_count(), 1);
}

#[tokio::test]
async fn an_answer_is_reused_without_prompting_again() {
    let l = launcher().await;
    let app = install_app(&l.daemon, "feed", &["api.example.com"], false);
    let context = l.registry.launch(&app, &user("bob")).await.unwrap();
    let surface = MockSurface::new();
    l.registry
        .surface_attached(l.windows.last().unwrap().id(), surface.clone())
        .unwrap();

    l.prompt.queue(Some(PromptDecision::allow_once()));
    assert!(surface.fetch("https://api.example.com/a").await.is_allowed());
    assert!(surface.fetch("https://api.example.com/b").await.is_allowed());
    assert_eq!(l.prompt.ask_count(), 1);
    assert_eq!(surface.sent().len(), 2);

    // Not remembered: the stored grants are untouched.
    let check = PermissionCheck::host("api.example.com");
    assert_eq!(context.settings().evaluate(&check), Evaluation::Undecided);
    assert_eq!(context.decisions().len(), 1);
}

#[tokio::test]
async fn remembered_answers_become_stored_grants() {
    let l = launcher().await;
    let app = install_app(&l.daemon, "feed", &["api.example.com"], false);
    let context = l.registry.launch(&app, &user("bob")).await.unwrap();
    let surface = MockSurface::new();
    l.registry
        .surface_attached(l.windows.last().unwrap().id(), surface.clone())
        .unwrap();

    l.prompt.queue(Some(PromptDecision::allow_always()));
    assert!(surface.fetch("https://api.example.com/").await.is_allowed());

    let check = PermissionCheck::host("api.example.com");
    assert_eq!(context.settings().evaluate(&check), Evaluation::Granted);
    let stored = l.daemon.backends.settings(&app, &user("bob")).unwrap();
    assert_eq!(stored.evaluate(&check), Evaluation::Granted);
}

#[tokio::test]
async fn ungranted_optional_destination_is_denied_generically() {
    let l = launcher().await;
    let app = install_app(&l.daemon, "feed", &["api.example.com"], false);
    l.registry.launch(&app, &user("bob")).await.unwrap();
    let surface = MockSurface::new();
    l.registry
        .surface_attached(l.windows.last().unwrap().id(), surface.clone())
        .unwrap();

    l.prompt.queue(Some(PromptDecision::deny_once()));
    let verdict = surface.fetch("https://api.example.com/secret").await;

    assert_eq!(verdict, RequestVerdict::Deny);
    assert!(surface.sent().is_empty());
    let reason = verdict.to_string();
    assert!(!reason.contains("example"));
    assert_eq!(reason, "permission denied");

    // The refusal holds for identical requests.
    assert!(!surface.fetch("https://api.example.com/other").await.is_allowed());
    assert_eq!(l.prompt.ask_count(), 1);
}

#[tokio::test]
async fn undeclared_destinations_are_denied_without_asking() {
    let l = launcher_with(
        MockWindowFactory::new(),
        MockPrompt::new().with_default(PromptDecision::allow_always()),
        Duration::from_secs(5),
    )
    .await;
    let app = install_app(&l.daemon, "feed", &["api.example.com"], false);
    let context = l.registry.launch(&app, &user("bob")).await.unwrap();
    let surface = MockSurface::new();
    l.registry
        .surface_attached(l.windows.last().unwrap().id(), surface.clone())
        .unwrap();

    let verdict = surface.fetch("https://exfil.example.net/upload").await;

    assert_eq!(verdict, RequestVerdict::Deny);
    assert_eq!(verdict.to_string(), "permission denied");
    assert!(surface.sent().is_empty());
    assert_eq!(l.prompt.ask_count(), 0);
    assert!(context.decisions().is_empty());

    // The declared destination still goes through the prompt.
    assert!(surface.fetch("https://api.example.com/items").await.is_allowed());
    assert_eq!(l.prompt.ask_count(), 1);
}

#[tokio::test]
async fn stored_grants_cover_undeclared_destinations() {
    let l = launcher().await;
    let app = install_app(&l.daemon, "feed", &[], false);
    let bob = user("bob");
    let context = l.registry.launch(&app, &bob).await.unwrap();
    context
        .record_decision(&PermissionCheck::host("cdn.io"), PromptDecision::allow_always())
        .await
        .unwrap();
    let surface = MockSurface::new();
    l.registry
        .surface_attached(l.windows.last().unwrap().id(), surface.clone())
        .unwrap();

    assert!(surface.fetch("https://cdn.io/lib.js").await.is_allowed());
    assert_eq!(l.prompt.ask_count(), 0);
    assert!(l.daemon.backends.settings(&app, &bob).unwrap().checked);
}

#[tokio::test]
async fn identical_requests_in_flight_share_one_prompt() {
    let l = launcher_with(
        MockWindowFactory::new(),
        MockPrompt::new()
            .with_default(PromptDecision::allow_once())
            .with_delay(Duration::from_millis(100)),
        Duration::from_secs(5),
    )
    .await;
    let app = install_app(&l.daemon, "feed", &["api.example.com", "img.example.com"], false);
    l.registry.launch(&app, &user("bob")).await.unwrap();
    let surface = MockSurface::new();
    l.registry
        .surface_attached(l.windows.last().unwrap().id(), surface.clone())
        .unwrap();

    let (a, b, c) = tokio::join!(
        surface.fetch("https://api.example.com/a"),
        surface.fetch("https://api.example.com/b"),
        surface.fetch("https://img.example.com/logo.png"),
    );

    assert!(a.is_allowed() && b.is_allowed() && c.is_allowed());
    assert_eq!(l.prompt.ask_count(), 2);
    assert_eq!(surface.sent().len(), 3);
}

#[tokio::test]
async fn remembered_refusals_are_stored_as_denials() {
    let l = launcher().await;
    let app = install_app(&l.daemon, "feed", &["tracker.io"], false);
    let context = l.registry.launch(&app, &user("bob")).await.unwrap();
    let surface = MockSurface::new();
    l.registry
        .surface_attached(l.windows.last().unwrap().id(), surface.clone())
        .unwrap();

    l.prompt.queue(Some(PromptDecision::deny_always()));
    assert!(!surface.fetch("https://tracker.io/pixel").await.is_allowed());

    let check = PermissionCheck::host("tracker.io");
    assert_eq!(context.settings().evaluate(&check), Evaluation::Denied);
    let stored = l.daemon.backends.settings(&app, &user("bob")).unwrap();
    assert_eq!(stored.evaluate(&check), Evaluation::Denied);
    assert!(surface.sent().is_empty());
}

#[tokio::test]
async fn unavailable_prompt_denies_without_asking() {
    let l = launcher().await;
    let app = install_app(&l.daemon, "feed", &["anywhere.io"], false);
    l.registry.launch(&app, &user("bob")).await.unwrap();
    let surface = MockSurface::new();
    l.registry
        .surface_attached(l.windows.last().unwrap().id(), surface.clone())
        .unwrap();

    l.prompt.set_unavailable(true);
    assert!(!surface.fetch("https://anywhere.io").await.is_allowed());
    assert_eq!(l.prompt.ask_count(), 0);

    l.registry.enforcer().clear_prompt();
    l.prompt.set_unavailable(false);
    assert!(!surface.fetch("https://anywhere.io").await.is_allowed());
    assert_eq!(l.prompt.ask_count(), 0);
}

#[tokio::test]
async fn slow_prompts_time_out_to_deny() {
    let l = launcher_with(
        MockWindowFactory::new(),
        MockPrompt::new()
            .with_default(PromptDecision::allow_always())
            .with_delay(Duration::from_millis(500)),
        Duration::from_millis(50),
    )
    .await;
    let app = install_app(&l.daemon, "feed", &["slow.io"], false);
    let context = l.registry.launch(&app, &user("bob")).await.unwrap();
    let surface = MockSurface::new();
    l.registry
        .surface_attached(l.windows.last().unwrap().id(), surface.clone())
        .unwrap();

    assert!(!surface.fetch("https://slow.io").await.is_allowed());
    assert_eq!(l.prompt.ask_count(), 1);
    assert!(context.decisions().is_empty());
}

#[tokio::test]
async fn detaching_while_prompting_denies() {
    let l = launcher_with(
        MockWindowFactory::new(),
        MockPrompt::new()
            .with_default(PromptDecision::allow_once())
            .with_delay(Duration::from_millis(200)),
        Duration::from_secs(5),
    )
    .await;
    let app = install_app(&l.daemon, "feed", &["late.io"], false);
    l.registry.launch(&app, &user("bob")).await.unwrap();
    let surface = MockSurface::new();
    l.registry
        .surface_attached(l.windows.last().unwrap().id(), surface.clone())
        .unwrap();

    let fetching = {
        let surface = surface.clone();
        tokio::spawn(async move { surface.fetch("https://late.io").await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    l.registry.surface_destroyed(surface.id());

    assert_eq!(fetching.await.unwrap(), RequestVerdict::Deny);
    assert!(surface.sent().is_empty());
    assert_eq!(l.prompt.ask_count(), 1);
}

#[tokio::test]
async fn destroyed_surfaces_leave_no_lookup_behind() {
    let l = launcher().await;
    let app = install_app(&l.daemon, "feed", &[], false);
    let context = l.registry.launch(&app, &user("bob")).await.unwrap();
    let surface = MockSurface::new();
    l.registry
        .surface_attached(l.windows.last().unwrap().id(), surface.clone())
        .unwrap();
    assert_eq!(l.registry.surface_count(), 1);

    l.registry.surface_destroyed(surface.id());
    assert_eq!(l.registry.surface_count(), 0);
    assert!(!surface.has_guard());
    assert!(context.surface_id().is_none());
    assert!(l.registry.context_for_surface(surface.id()).is_none());

    // Unknown surfaces are ignored.
    l.registry.surface_destroyed(surface.id());
}

#[tokio::test]
async fn a_replaced_surface_loses_its_guard() {
    let l = launcher().await;
    let app = install_app(&l.daemon, "feed", &[], false);
    l.registry.launch(&app, &user("bob")).await.unwrap();
    let window_id = l.windows.last().unwrap().id();

    let first = MockSurface::new();
    let second = MockSurface::new();
    l.registry.surface_attached(window_id, first.clone()).unwrap();
    l.registry.surface_attached(window_id, second.clone()).unwrap();

    assert!(!first.has_guard());
    assert!(second.has_guard());
    assert_eq!(l.registry.surface_count(), 1);
}

#[tokio::test]
async fn the_lookup_never_keeps_a_closed_context_alive() {
    let l = launcher().await;
    let app = install_app(&l.daemon, "feed", &[], false);
    let context = l.registry.launch(&app, &user("bob")).await.unwrap();
    let weak = Arc::downgrade(&context);
    drop(context);
    let surface = MockSurface::new();
    l.registry
        .surface_attached(l.windows.last().unwrap().id(), surface.clone())
        .unwrap();

    l.registry
        .window_closed(l.windows.last().unwrap().id())
        .await
        .unwrap();

    assert!(weak.upgrade().is_none());
    assert!(!surface.fetch("https://example.com").await.is_allowed());
    assert_eq!(l.registry.surface_count(), 0);
}

#[tokio::test]
async fn unparseable_urls_are_denied() {
    let l = launcher().await;
    let app = install_app(&l.daemon, "feed", &[], false);
    l.registry.launch(&app, &user("bob")).await.unwrap();
    let surface = MockSurface::new();
    l.registry
        .surface_attached(l.windows.last().unwrap().id(), surface.clone())
        .unwrap();

    assert!(!surface.fetch("not a url").await.is_allowed());
    assert!(!surface.fetch("data:text/plain,hi").await.is_allowed());
    assert_eq!(l.prompt.ask_count(), 0);
}
