use std::env;
use std::path::Path;
use std::process::ExitCode;

use pagefold::{Chapter, FontSizeSet, ReaderPosition};
use pagefold_render::{
    FileRenderCacheStore, LayoutConfig, LayoutEngine, MemoryCacheStore, NavigationController,
    NavigationOptions, PageCache,
};
use serde::{Deserialize, Serialize};

const DEFAULT_PAGE_WIDTH: u32 = 450;
const DEFAULT_PAGE_HEIGHT: u32 = 600;
const DEFAULT_PADDING: u32 = 30;

#[derive(Clone, Debug)]
struct Args {
    chapters_path: String,
    page_width: u32,
    page_height: u32,
    padding: u32,
    font_size: Option<String>,
    page: Option<String>,
    cache_dir: Option<String>,
    prebuild: bool,
    out_path: Option<String>,
    json: bool,
}

/// Chapter record as produced by the content loader.
#[derive(Clone, Debug, Deserialize)]
struct PersistedChapter {
    #[serde(rename = "chapterTitle")]
    chapter_title: String,
    #[serde(rename = "chapterContents", default)]
    chapter_contents: Vec<String>,
}

impl From<PersistedChapter> for Chapter {
    fn from(value: PersistedChapter) -> Self {
        Chapter::new(value.chapter_title, value.chapter_contents)
    }
}

#[derive(Clone, Debug, Serialize)]
struct PreviewMeta {
    page_count: usize,
    page_index: usize,
    font_size: u32,
    page_label: String,
    query: String,
    page_width: u32,
    page_height: u32,
    padding: u32,
}

#[derive(Clone, Debug, Serialize)]
struct PreviewPayload<'a> {
    meta: PreviewMeta,
    pages: &'a [String],
}

fn main() -> ExitCode {
    match run(env::args().collect()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            eprintln!("error: {}", msg);
            eprintln!("{}", help_text());
            ExitCode::FAILURE
        }
    }
}

fn run(args: Vec<String>) -> Result<(), String> {
    let cli = parse_args(args)?;
    let chapters = load_chapters(&cli.chapters_path)?;

    let sizes = FontSizeSet::default();
    let position = ReaderPosition::from_query(cli.page.as_deref(), cli.font_size.as_deref(), &sizes);
    let cfg = LayoutConfig::for_page(cli.page_width, cli.page_height).with_padding(cli.padding);
    let engine = LayoutEngine::new(cfg);

    let cache = match &cli.cache_dir {
        Some(dir) => PageCache::new(FileRenderCacheStore::new(dir)),
        None => PageCache::new(MemoryCacheStore::new()),
    };
    if cli.prebuild {
        let stored = cache.build_all(&chapters, &engine, sizes.sizes());
        println!("prebuilt {} of {} font sizes", stored, sizes.sizes().len());
    }

    let nav = NavigationController::new(
        chapters,
        engine,
        cache,
        NavigationOptions::default()
            .with_font_sizes(sizes)
            .with_initial(position),
    );
    if nav.pages().is_empty() {
        return Err("content produced no measurable pages".to_string());
    }

    let payload = PreviewPayload {
        meta: PreviewMeta {
            page_count: nav.page_count(),
            page_index: nav.page_index(),
            font_size: nav.font_size(),
            page_label: nav.page_label(),
            query: nav.position().to_query(),
            page_width: cli.page_width,
            page_height: cli.page_height,
            padding: cli.padding,
        },
        pages: nav.pages(),
    };

    if cli.json {
        let json = serde_json::to_string_pretty(&payload).map_err(|e| e.to_string())?;
        println!("{}", json);
    }

    if let Some(out_path) = &cli.out_path {
        if let Some(parent) = Path::new(out_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
            }
        }
        std::fs::write(out_path, build_html(&payload)).map_err(|e| e.to_string())?;
        println!("wrote page sheet to {}", out_path);
    }

    if !cli.json {
        println!(
            "pages={} font_size={} current={} ({})",
            payload.meta.page_count,
            payload.meta.font_size,
            payload.meta.page_label,
            payload.meta.query
        );
        if let Some(page) = nav.current_page() {
            println!("{}", page);
        }
    }
    Ok(())
}

fn load_chapters(path: &str) -> Result<Vec<Chapter>, String> {
    let raw = std::fs::read_to_string(path).map_err(|e| format!("{}: {}", path, e))?;
    let chapters: Vec<PersistedChapter> =
        serde_json::from_str(&raw).map_err(|e| format!("{}: {}", path, e))?;
    Ok(chapters.into_iter().map(Chapter::from).collect())
}

fn build_html(payload: &PreviewPayload<'_>) -> String {
    let meta = &payload.meta;
    let mut sheets = String::new();
    for (idx, page) in payload.pages.iter().enumerate() {
        let current = if idx == meta.page_index { " current" } else { "" };
        sheets.push_str(&format!(
            "<section class=\"page{}\"><div class=\"body\">{}</div><footer>{} / {}</footer></section>\n",
            current,
            page,
            idx + 1,
            meta.page_count
        ));
    }
    format!(
        r#"<!doctype html>
<html lang="ja">
<head>
<meta charset="utf-8">
<title>pagefold preview</title>
<style>
body {{ margin: 24px; font-family: sans-serif; background: #eee; }}
.sheet {{ display: flex; flex-wrap: wrap; flex-direction: row-reverse; gap: 24px; }}
.page {{ background: #fff; border: 2px solid #666; padding: 7px {pad}px; }}
.page.current {{ border-color: #c33; }}
.body {{
  writing-mode: vertical-rl;
  width: {width}px;
  height: {height}px;
  overflow: hidden;
  font-size: {font}px;
  line-height: 1.5;
  font-family: '游明朝体', 'Noto Serif JP', serif;
}}
.divider {{ text-align: center; padding: 0 1em; }}
footer {{ text-align: center; font-size: 14px; margin-top: 6px; }}
</style>
</head>
<body>
<p>{label} &middot; {query}</p>
<div class="sheet">
{sheets}</div>
</body>
</html>
"#,
        pad = meta.padding / 2,
        width = meta.page_width,
        height = meta.page_height,
        font = meta.font_size,
        label = meta.page_label,
        query = meta.query,
        sheets = sheets,
    )
}

fn parse_args(args: Vec<String>) -> Result<Args, String> {
    if args.len() >= 2 && (args[1] == "--help" || args[1] == "-h") {
        return Err("help requested".to_string());
    }

    let has_positional = args.get(1).is_some_and(|v| !v.starts_with("--"));
    let mut cfg = Args {
        chapters_path: if has_positional {
            args[1].clone()
        } else {
            String::new()
        },
        page_width: DEFAULT_PAGE_WIDTH,
        page_height: DEFAULT_PAGE_HEIGHT,
        padding: DEFAULT_PADDING,
        font_size: None,
        page: None,
        cache_dir: None,
        prebuild: false,
        out_path: None,
        json: false,
    };

    let mut i = if has_positional { 2usize } else { 1usize };
    while i < args.len() {
        match args[i].as_str() {
            "--chapters" => {
                cfg.chapters_path = flag_value(&args, i)?.to_string();
                i += 2;
            }
            "--width" => {
                cfg.page_width = parse_dimension(&args, i)?;
                i += 2;
            }
            "--height" => {
                cfg.page_height = parse_dimension(&args, i)?;
                i += 2;
            }
            "--padding" => {
                let v = flag_value(&args, i)?;
                cfg.padding = v
                    .parse::<u32>()
                    .map_err(|_| format!("invalid --padding value '{}'", v))?;
                i += 2;
            }
            "--font-size" => {
                cfg.font_size = Some(flag_value(&args, i)?.to_string());
                i += 2;
            }
            "--page" => {
                cfg.page = Some(flag_value(&args, i)?.to_string());
                i += 2;
            }
            "--cache-dir" => {
                cfg.cache_dir = Some(flag_value(&args, i)?.to_string());
                i += 2;
            }
            "--out" => {
                cfg.out_path = Some(flag_value(&args, i)?.to_string());
                i += 2;
            }
            "--prebuild" => {
                cfg.prebuild = true;
                i += 1;
            }
            "--json" => {
                cfg.json = true;
                i += 1;
            }
            other => return Err(format!("unknown argument '{}'", other)),
        }
    }

    if cfg.chapters_path.is_empty() {
        return Err("--chapters is required".to_string());
    }
    Ok(cfg)
}

fn flag_value(args: &[String], i: usize) -> Result<&str, String> {
    args.get(i + 1)
        .map(String::as_str)
        .ok_or_else(|| format!("{} requires a value", args[i]))
}

fn parse_dimension(args: &[String], i: usize) -> Result<u32, String> {
    let v = flag_value(args, i)?;
    match v.parse::<u32>() {
        Ok(px) if px > 0 => Ok(px),
        _ => Err(format!("invalid {} value '{}'", args[i], v)),
    }
}

fn help_text() -> &'static str {
    "usage: pagefold-preview [CHAPTERS.json] [--chapters FILE] [--width PX] [--height PX]
                        [--padding PX] [--font-size PX] [--page N] [--cache-dir DIR]
                        [--prebuild] [--out FILE.html] [--json]"
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(items: &[&str]) -> Vec<String> {
        std::iter::once("pagefold-preview")
            .chain(items.iter().copied())
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn parse_args_defaults_match_reader_geometry() {
        let args = parse_args(argv(&["book.json"])).expect("valid args");
        assert_eq!(args.chapters_path, "book.json");
        assert_eq!(args.page_width, 450);
        assert_eq!(args.page_height, 600);
        assert_eq!(args.padding, 30);
        assert!(args.font_size.is_none());
        assert!(!args.prebuild);
    }

    #[test]
    fn parse_args_reads_flags() {
        let args = parse_args(argv(&[
            "--chapters",
            "b.json",
            "--width",
            "300",
            "--font-size",
            "22",
            "--page",
            "5",
            "--prebuild",
            "--json",
        ]))
        .expect("valid args");
        assert_eq!(args.chapters_path, "b.json");
        assert_eq!(args.page_width, 300);
        assert_eq!(args.font_size.as_deref(), Some("22"));
        assert_eq!(args.page.as_deref(), Some("5"));
        assert!(args.prebuild && args.json);
    }

    #[test]
    fn parse_args_rejects_bad_input() {
        assert!(parse_args(argv(&[])).is_err());
        assert!(parse_args(argv(&["b.json", "--width", "0"])).is_err());
        assert!(parse_args(argv(&["b.json", "--width"])).is_err());
        assert!(parse_args(argv(&["b.json", "--bogus"])).is_err());
    }

    #[test]
    fn persisted_chapter_uses_loader_field_names() {
        let raw = r#"[{"chapterTitle":"一","chapterContents":["a\nb","c"]},{"chapterTitle":"二"}]"#;
        let parsed: Vec<PersistedChapter> = serde_json::from_str(raw).expect("json");
        let chapters: Vec<Chapter> = parsed.into_iter().map(Chapter::from).collect();
        assert_eq!(chapters[0].title, "一");
        assert_eq!(chapters[0].paragraphs, vec!["a\nb".to_string(), "c".to_string()]);
        assert!(chapters[1].paragraphs.is_empty());
    }
}
