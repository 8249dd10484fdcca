use std::path::PathBuf;

use anyhow::Context as _;
use engine::{
    Engine, PageRenderRequest, PaginatedRenderer, RenderOutcome, RgbaBitmap, TextArea,
    ViewportGeometry,
};
use folio_core::{DocumentFormat, Rotation, ViewportSize};

fn main() {
    if let Err(err) = run() {
        eprintln!("{err:?}");
        std::process::exit(1);
    }
}

struct FixedViewport(ViewportSize);

impl ViewportGeometry for FixedViewport {
    fn available_size(&self) -> ViewportSize {
        self.0
    }
}

fn run() -> anyhow::Result<()> {
    let mut file: Option<PathBuf> = None;
    let mut out: Option<PathBuf> = None;
    let mut page: u32 = 1;
    let mut scale: f32 = 1.0;
    let mut rotation = Rotation::Upright;
    let mut fit: Option<ViewportSize> = None;

    let mut args = std::env::args_os().skip(1);
    while let Some(arg) = args.next() {
        let arg_str = arg.to_string_lossy();
        match arg_str.as_ref() {
            "--file" => {
                let value = args.next().context("missing value for --file")?;
                file = Some(PathBuf::from(value));
            }
            "--out" => {
                let value = args.next().context("missing value for --out")?;
                out = Some(PathBuf::from(value));
            }
            "--page" => {
                let value = args.next().context("missing value for --page")?;
                let value_str = value.to_string_lossy();
                page = value_str
                    .parse::<u32>()
                    .with_context(|| format!("invalid --page value: {value_str}"))?;
                if page == 0 {
                    anyhow::bail!("--page must be >= 1");
                }
            }
            "--scale" => {
                let value = args.next().context("missing value for --scale")?;
                let value_str = value.to_string_lossy();
                scale = value_str
                    .parse::<f32>()
                    .with_context(|| format!("invalid --scale value: {value_str}"))?;
            }
            "--fit" => {
                let value = args.next().context("missing value for --fit")?;
                fit = Some(parse_size(&value.to_string_lossy())?);
            }
            "--rotate" => rotation = Rotation::Quarter,
            "-h" | "--help" => {
                print_help();
                return Ok(());
            }
            other => anyhow::bail!("unknown arg: {other} (try --help)"),
        }
    }

    let file = file.context("must pass --file <path> (try --help)")?;
    let bytes = std::fs::read(&file).with_context(|| format!("read {}", file.display()))?;
    let name = file.to_string_lossy();
    let format = DocumentFormat::detect(&name);
    println!("format: {format}");

    let engine = Engine::new();
    match format {
        DocumentFormat::Paginated => {
            let document = engine.open_paginated(bytes)?;
            let mut renderer = PaginatedRenderer::new(Box::new(document));
            println!("pages: {}", renderer.page_count());

            let viewport = FixedViewport(fit.unwrap_or(ViewportSize::new(1200, 1600)));
            let ticket = renderer.issue(PageRenderRequest {
                page,
                scale,
                rotation,
                fit: fit.is_some(),
            });
            match renderer.render(&ticket, &viewport) {
                RenderOutcome::Completed(rendered) => {
                    println!(
                        "render: ok ({}x{} at scale {:.3})",
                        rendered.bitmap.width, rendered.bitmap.height, rendered.scale
                    );
                    write_png(rendered.bitmap, out.as_ref())?;
                }
                RenderOutcome::Cancelled => anyhow::bail!("render was superseded"),
                RenderOutcome::Failed(err) => return Err(err.into()),
            }
        }
        DocumentFormat::Archive => {
            let pages = engine.open_archive(&bytes)?;
            println!("pages: {}", pages.len());
            let image = pages
                .page(page)
                .with_context(|| format!("no page {page}"))?;
            println!("page: {} ({})", image.name(), image.mime());
            let mut bitmap = RgbaBitmap::from_image(image.decode()?.to_rgba8());
            if rotation.is_quarter() {
                bitmap = bitmap.rotated_quarter()?;
            }
            write_png(bitmap, out.as_ref())?;
        }
        DocumentFormat::Reflowable => {
            let mut renderer = engine.open_reflowable(bytes, TextArea::new(80, 40))?;
            println!("pages: {}", renderer.total_pages());
            while renderer.location() < page {
                if !renderer.next() {
                    break;
                }
            }
            println!("location: {}", renderer.location());
            for line in renderer.visible_lines() {
                println!("{line}");
            }
        }
    }
    Ok(())
}

fn parse_size(value: &str) -> anyhow::Result<ViewportSize> {
    let (w, h) = value
        .split_once('x')
        .with_context(|| format!("expected WIDTHxHEIGHT, got {value}"))?;
    Ok(ViewportSize::new(w.trim().parse()?, h.trim().parse()?))
}

fn write_png(bitmap: RgbaBitmap, out: Option<&PathBuf>) -> anyhow::Result<()> {
    let Some(out) = out else {
        return Ok(());
    };
    bitmap
        .into_image()?
        .save_with_format(out, image::ImageFormat::Png)
        .with_context(|| format!("write {}", out.display()))?;
    println!("wrote {}", out.display());
    Ok(())
}

fn print_help() {
    println!(
        "render_probe\n\nUSAGE:\n  render_probe --file <path> [--page N] [--scale S] [--fit WxH] [--rotate] [--out page.png]\n\nNOTES:\n  Pdfium is located through FOLIO_PDFIUM_LIB_PATH or FOLIO_PDFIUM_DIR when set.\n  Archives and e-books do not need pdfium.\n"
    );
}
