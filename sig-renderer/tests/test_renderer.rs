use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sig_renderer::{MediaResolver, Renderer, RendererEvent};
use sig_types::{
    Action, ActionTrigger, ActionType, CacheKind, Layout, PlaylistGrouping, Region, Widget, WidgetType,
};
use tokio::time::timeout;

struct FakeResolver;

#[async_trait]
impl MediaResolver for FakeResolver {
    async fn resolve_media(&self, _kind: CacheKind, id: &str) -> Option<(String, String)> {
        Some((format!("/cache/media/{id}"), "image/png".to_string()))
    }

    async fn resolve_widget_html(
        &self,
        _layout_id: i64,
        _region_id: &str,
        _widget_id: &str,
    ) -> Option<(String, Vec<String>, Option<u32>)> {
        None
    }

    async fn add_dependant(&self, _kind: CacheKind, _id: &str, _layout_id: i64) {}
    async fn remove_layout_dependants(&self, _layout_id: i64) {}
    async fn prioritize(&self, _kind: CacheKind, _id: &str) {}
}

fn widget(id: &str, duration: u32) -> Widget {
    Widget {
        id: id.to_string(),
        widget_type: WidgetType::Image,
        file_id: Some(format!("file-{id}")),
        duration,
        use_duration: true,
        from_dt: None,
        to_dt: None,
        trans_in: None,
        trans_out: None,
        actions: vec![Action {
            id: format!("action-{id}"),
            trigger: ActionTrigger::Touch,
            action_type: ActionType::Next,
            target_id: None,
        }],
        audio_overlays: Vec::new(),
        commands: Vec::new(),
        grouping: PlaylistGrouping::default(),
        enable_stat: true,
        raw_html: None,
        options: Default::default(),
    }
}

fn layout_with_two_widgets() -> Layout {
    Layout {
        layout_id: 1,
        width: 1920.0,
        height: 1080.0,
        duration: None,
        background_color: None,
        background_image_file_id: None,
        regions: vec![Region {
            id: "r1".to_string(),
            left: 0.0,
            top: 0.0,
            width: 1920.0,
            height: 1080.0,
            zindex: 0,
            loop_playback: true,
            exit_transition: None,
            widgets: vec![widget("w1", 1), widget("w2", 1)],
            actions: Vec::new(),
            enable_stat: true,
            is_drawer: false,
        }],
        drawers: Vec::new(),
        actions: Vec::new(),
        enable_stat: true,
    }
}

#[tokio::test]
async fn cold_render_emits_layout_and_widget_start() {
    let mut renderer = Renderer::new(Arc::new(FakeResolver));
    let mut events = renderer.subscribe();
    let layout = layout_with_two_widgets();

    renderer.render(&layout).await.unwrap();

    let first = events.recv().await.unwrap();
    assert!(matches!(first, RendererEvent::LayoutStart { layout_id: 1 }));
    let second = events.recv().await.unwrap();
    assert!(matches!(second, RendererEvent::WidgetStart { ref widget_id, .. } if widget_id == "w1"));
}

#[tokio::test]
async fn region_cycles_to_second_widget_after_duration() {
    let mut renderer = Renderer::new(Arc::new(FakeResolver));
    let mut events = renderer.subscribe();
    let layout = layout_with_two_widgets();
    renderer.render(&layout).await.unwrap();

    // Drain LayoutStart + first WidgetStart.
    events.recv().await.unwrap();
    events.recv().await.unwrap();

    // Drive the tick loop until the second widget starts.
    let found = timeout(Duration::from_secs(5), async {
        loop {
            tokio::select! {
                _ = renderer.poll_tick() => {}
                event = events.recv() => {
                    if let Ok(RendererEvent::WidgetStart { widget_id, .. }) = event {
                        if widget_id == "w2" {
                            return;
                        }
                    }
                }
            }
        }
    })
    .await;

    assert!(found.is_ok(), "expected widget w2 to start within timeout");
}

#[tokio::test]
async fn replay_same_layout_does_not_rebuild_but_restarts_regions() {
    let mut renderer = Renderer::new(Arc::new(FakeResolver));
    let mut events = renderer.subscribe();
    let layout = layout_with_two_widgets();

    renderer.render(&layout).await.unwrap();
    events.recv().await.unwrap(); // LayoutStart
    events.recv().await.unwrap(); // WidgetStart w1

    renderer.render(&layout).await.unwrap(); // replay
    let replay_start = events.recv().await.unwrap();
    assert!(matches!(replay_start, RendererEvent::LayoutStart { layout_id: 1 }));
    let replay_widget = events.recv().await.unwrap();
    assert!(matches!(replay_widget, RendererEvent::WidgetStart { ref widget_id, .. } if widget_id == "w1"));
}

#[tokio::test]
async fn touch_action_emits_widget_action_event() {
    let mut renderer = Renderer::new(Arc::new(FakeResolver));
    let mut events = renderer.subscribe();
    let layout = layout_with_two_widgets();
    renderer.render(&layout).await.unwrap();
    events.recv().await.unwrap(); // LayoutStart
    events.recv().await.unwrap(); // WidgetStart

    renderer.dispatch_touch("w1");
    let event = events.recv().await.unwrap();
    assert!(matches!(event, RendererEvent::WidgetAction { ref widget_id, .. } if widget_id == "w1"));
}
