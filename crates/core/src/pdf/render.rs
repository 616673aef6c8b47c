use crate::pdf::layout::{PageLayout, Weight, PAGE_HEIGHT_MM, PAGE_WIDTH_MM};
use anyhow::anyhow;
use printpdf::{BuiltinFont, Color, Mm, PdfDocument, Rgb};

pub(crate) fn render_pages(title: &str, pages: &[PageLayout]) -> anyhow::Result<Vec<u8>> {
    let (doc, first_page, first_layer) = PdfDocument::new(
        title,
        Mm(PAGE_WIDTH_MM),
        Mm(PAGE_HEIGHT_MM),
        "Layer 1",
    );
    let regular = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| anyhow!("load Helvetica failed: {e:?}"))?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|e| anyhow!("load Helvetica-Bold failed: {e:?}"))?;

    for (idx, page) in pages.iter().enumerate() {
        let (page_idx, layer_idx) = if idx == 0 {
            (first_page, first_layer)
        } else {
            doc.add_page(
                Mm(PAGE_WIDTH_MM),
                Mm(PAGE_HEIGHT_MM),
                format!("Layer {}", idx + 1),
            )
        };
        let layer = doc.get_page(page_idx).get_layer(layer_idx);

        for run in &page.runs {
            let font = match run.weight {
                Weight::Regular => &regular,
                Weight::Bold => &bold,
            };
            layer.set_fill_color(Color::Rgb(Rgb::new(run.tint.0, run.tint.1, run.tint.2, None)));
            layer.use_text(run.text.as_str(), run.size_pt, Mm(run.x_mm), Mm(run.y_mm), font);
        }
    }

    doc.save_to_bytes()
        .map_err(|e| anyhow!("serialize pdf failed: {e:?}"))
}
