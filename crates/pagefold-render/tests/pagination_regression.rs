use std::sync::Arc;

use pagefold::{flatten_chapters, leading_sample, Chapter, ContentUnit, FontSizeSet, UnitKey};
use pagefold_render::{
    AnimationPhase, CacheKey, FixedAdvanceMeasurer, HeuristicMeasurer, LayoutConfig,
    LayoutEngine, MemoryCacheStore, NavigationController, NavigationOptions, PageCache,
    RenderCacheStore, Relocation, TextMeasurer,
};

fn fixed_engine(page_width: u32) -> LayoutEngine {
    LayoutEngine::new(LayoutConfig::for_page(page_width, 600))
        .with_text_measurer(Arc::new(FixedAdvanceMeasurer::default()))
}

fn novel() -> Vec<Chapter> {
    vec![
        Chapter::new(
            "第一章　雨",
            [
                "　その日は朝から雨が降っていた。\n「傘、持ってる？」\n",
                "（まただ）と彼は思った。窓の外では、灰色の雲が低く垂れこめ、街の輪郭をぼんやりと溶かしていた。",
                "　駅までの道は長かった。",
            ],
        ),
        Chapter::new("第二章　晴れ", ["「おはよう」\n　空は嘘のように青かった。"]),
        Chapter::new("第三章", Vec::<String>::new()),
        Chapter::new(
            "第四章　夜",
            ["　長い長い夜の話をしよう。それは誰も知らない、誰にも知られてはならない話だ。"],
        ),
    ]
}

fn assert_layout_properties(engine: &LayoutEngine, chapters: &[Chapter], font_size: u32) {
    let plan = engine
        .place_units(chapters, font_size)
        .expect("layout should be measurable");

    // Monotonic pages.
    for pair in plan.placements.windows(2) {
        assert!(pair[1].page >= pair[0].page, "pages went backwards: {pair:?}");
    }
    assert_eq!(
        plan.page_count,
        plan.placements.last().map_or(1, |p| p.page + 1)
    );

    // Coverage: fragments rejoin into the flattened sequence, in order.
    let expected = flatten_chapters(chapters);
    let mut rebuilt: Vec<(UnitKey, String)> = Vec::new();
    for placed in &plan.placements {
        let text = placed.unit.unit.text().to_string();
        match (&placed.unit.unit, rebuilt.last_mut()) {
            (ContentUnit::LineTail(_), Some((key, joined))) if *key == placed.unit.key => {
                joined.push_str(&text);
            }
            _ => rebuilt.push((placed.unit.key, text)),
        }
    }
    let expected: Vec<(UnitKey, String)> = expected
        .iter()
        .map(|unit| (unit.key, unit.unit.text().to_string()))
        .collect();
    assert_eq!(rebuilt, expected);

    // Titles other than the first open their page.
    for (idx, placed) in plan.placements.iter().enumerate().skip(1) {
        if matches!(placed.unit.unit, ContentUnit::Title(_)) {
            assert!(
                plan.placements[idx - 1].page < placed.page,
                "title {} shares page {}",
                placed.unit.key,
                placed.page
            );
        }
    }

    // Page markup agrees with the plan.
    let result = engine.layout(chapters, font_size);
    assert_eq!(result.pages.len(), result.page_count);
    assert_eq!(result.page_count, plan.page_count);
}

#[test]
fn title_then_short_line_yields_two_pages() {
    let chapters = vec![Chapter::new("Ch1", ["line"])];
    let result = fixed_engine(450).layout(&chapters, 18);
    assert_eq!(result.page_count, 2);
    assert!(result.pages[0].contains("<h4>Ch1</h4>"));
    assert!(!result.pages[0].contains("<p "));
    assert!(result.pages[1].contains("<p class=\"descriptive\">line</p>"));
}

#[test]
fn overlong_line_splits_into_line_and_tail() {
    // 10px per character on 120px pages. Page 1 holds "abcdef" and the
    // divider (90px), so "ghijkl" (60px) gets a 30px remainder.
    let chapters = vec![Chapter::new("T", ["abcdef", "ghijkl"])];
    let engine = fixed_engine(120);
    let plan = engine.place_units(&chapters, 10).expect("measurable");
    let fragments: Vec<_> = plan
        .placements
        .iter()
        .filter(|p| p.unit.key == UnitKey::line(0, 1, 0))
        .collect();
    assert_eq!(fragments.len(), 2);
    assert_eq!(fragments[0].unit.unit, ContentUnit::Line("ghi".into()));
    assert_eq!(fragments[0].page, 1);
    assert_eq!(fragments[1].unit.unit, ContentUnit::LineTail("jkl".into()));
    assert_eq!(fragments[1].page, 2);

    let result = engine.layout(&chapters, 10);
    assert!(result.pages[2].contains("<p class=\"conversation\">jkl</p>"));
}

#[test]
fn properties_hold_for_fixed_advance_measurer() {
    let chapters = novel();
    for page_width in [60, 100, 180, 450] {
        for font_size in [10, 14, 18] {
            assert_layout_properties(&fixed_engine(page_width), &chapters, font_size);
        }
    }
}

#[test]
fn properties_hold_for_heuristic_measurer() {
    let chapters = novel();
    let engine = LayoutEngine::new(LayoutConfig::for_page(450, 600))
        .with_text_measurer(Arc::new(HeuristicMeasurer::default()));
    for font_size in FontSizeSet::default().sizes() {
        assert_layout_properties(&engine, &chapters, *font_size);
    }
    let narrow = LayoutEngine::new(LayoutConfig::for_page(60, 120));
    assert_layout_properties(&narrow, &chapters, 24);
}

#[test]
fn layout_is_deterministic_across_engines() {
    let chapters = novel();
    let a = LayoutEngine::new(LayoutConfig::default()).layout(&chapters, 18);
    let b = LayoutEngine::new(LayoutConfig::default()).layout(&chapters, 18);
    assert_eq!(a, b);
}

#[test]
fn cache_entries_match_direct_layout_for_every_size() {
    let chapters = novel();
    let engine = fixed_engine(200);
    let store = MemoryCacheStore::new();
    let cache = PageCache::new(store.clone());
    let sizes = [12, 16, 20];
    assert_eq!(cache.build_all(&chapters, &engine, &sizes), 3);
    for size in sizes {
        assert_eq!(
            cache.get(&chapters, engine.config(), size),
            Some(engine.layout(&chapters, size))
        );
        let key = CacheKey::new(&chapters, engine.config(), size);
        assert!(store.load(key.as_str()).expect("load").is_some());
    }
}

#[test]
fn font_change_builds_missing_entries_and_relocates() {
    let chapters = novel();
    let engine = fixed_engine(200);
    let store = MemoryCacheStore::new();
    let sizes = FontSizeSet::new([16, 20], 16);
    let cache = PageCache::new(store.clone());

    // Only the 16px entry exists up front.
    assert_eq!(cache.build_all(&chapters, &engine, &[16]), 1);
    let mut nav = NavigationController::new(
        chapters.clone(),
        engine.clone(),
        cache,
        NavigationOptions::default().with_font_sizes(sizes),
    );
    assert_eq!(store.len(), 1);

    let target = nav.page_count() / 2;
    assert!(nav.go_to_page(target));
    let sample = nav
        .current_page()
        .and_then(leading_sample)
        .expect("visible page has content");

    let relocation = nav.set_font_size(20);
    assert_eq!(store.len(), 2);
    assert!(store
        .load(CacheKey::new(&chapters, engine.config(), 20).as_str())
        .expect("load")
        .is_some());
    match relocation {
        Relocation::Resolved(page) => {
            assert_eq!(nav.page_index(), page);
            assert!(nav.current_page().is_some_and(|p| p.contains(&sample)));
        }
        other => panic!("expected relocation to resolve, got {other:?}"),
    }
}

#[test]
fn rapid_forward_requests_advance_one_page() {
    let mut nav = NavigationController::new(
        novel(),
        fixed_engine(200),
        PageCache::new(MemoryCacheStore::new()),
        NavigationOptions::default(),
    );
    assert!(nav.page_count() > 2);
    assert!(nav.request_forward());
    assert!(!nav.request_forward());
    assert_eq!(nav.phase(), AnimationPhase::SlidingForward);
    let _reset = nav.on_transition_end();
    nav.on_tick();
    assert_eq!(nav.page_index(), 1);
}

struct Unmounted;

impl TextMeasurer for Unmounted {
    fn measure_text_px(&self, _text: &str, _style: &pagefold_render::MeasureStyle) -> f32 {
        0.0
    }

    fn is_ready(&self) -> bool {
        false
    }
}

#[test]
fn unmounted_surface_yields_empty_result_and_nothing_cached() {
    let engine = LayoutEngine::new(LayoutConfig::default()).with_text_measurer(Arc::new(Unmounted));
    let result = engine.layout(&novel(), 18);
    assert!(result.is_empty());
    assert!(result.pages.is_empty());

    let store = MemoryCacheStore::new();
    let cache = PageCache::new(store.clone());
    assert_eq!(cache.build_all(&novel(), &engine, &[16, 18]), 0);
    assert!(store.is_empty());
}

#[test]
fn shared_store_never_serves_another_page_height() {
    let chapters = novel();
    let store = MemoryCacheStore::new();
    let tall = LayoutEngine::new(LayoutConfig::for_page(450, 600));
    let short = LayoutEngine::new(LayoutConfig::for_page(450, 200));
    let sizes = FontSizeSet::default();

    let cache = PageCache::new(store.clone());
    assert_eq!(
        cache.build_all(&chapters, &tall, sizes.sizes()),
        sizes.sizes().len()
    );

    let nav = NavigationController::new(
        chapters.clone(),
        short.clone(),
        PageCache::new(store.clone()),
        NavigationOptions::default().with_font_sizes(sizes.clone()),
    );
    let direct = short.layout(&chapters, nav.font_size());
    assert_eq!(nav.pages(), direct.pages.as_slice());
    assert!(nav.pages().iter().all(|page| !page.contains("height:600px")));
    assert_eq!(store.len(), 2 * sizes.sizes().len());
}
