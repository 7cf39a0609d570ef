//! Placeholder geometry inheritance.
//!
//! A slide placeholder without its own transform takes the geometry of the
//! layout placeholder with the same `idx`. A layout placeholder without one
//! takes it from the master placeholder of the matching base type.

use crate::parser::{resolve_target, PptxDocument};
use crate::shapes::{parse_shape_tree, Shape};
use linker_core::Result;

const LAYOUT_REL: &str = "/slideLayout";
const MASTER_REL: &str = "/slideMaster";

/// Fill in missing geometry of placeholders on `slide_part`.
pub(crate) fn inherit_placeholder_geometry(
    document: &PptxDocument,
    slide_part: &str,
    shapes: &mut [Shape],
) -> Result<()> {
    let needs_inheritance = |s: &Shape| s.geometry.is_none() && s.placeholder.is_some();
    if !shapes.iter().any(needs_inheritance) {
        return Ok(());
    }

    let Some(layout_part) = related_part(document, slide_part, LAYOUT_REL)? else {
        log::debug!("{} has no slide layout; placeholders keep zero geometry", slide_part);
        return Ok(());
    };
    let layout_shapes = parse_shape_tree(&document.read_part(&layout_part)?)?;

    // Loaded lazily: most layouts carry their own transforms.
    let mut master_shapes: Option<Vec<Shape>> = None;

    for shape in shapes.iter_mut().filter(|s| needs_inheritance(s)) {
        let Some(ph) = shape.placeholder.as_ref() else {
            continue;
        };
        let Some(layout_ph) = layout_shapes
            .iter()
            .find(|l| l.placeholder.as_ref().is_some_and(|lp| lp.idx == ph.idx))
        else {
            log::debug!("No layout placeholder with idx {} for shape {}", ph.idx, shape.id);
            continue;
        };

        if layout_ph.geometry.is_some() {
            shape.geometry = layout_ph.geometry;
            continue;
        }

        if master_shapes.is_none() {
            master_shapes = Some(match related_part(document, &layout_part, MASTER_REL)? {
                Some(master_part) => parse_shape_tree(&document.read_part(&master_part)?)?,
                None => Vec::new(),
            });
        }

        let base_type = layout_ph
            .placeholder
            .as_ref()
            .map(|lp| base_placeholder_type(&lp.ph_type))
            .unwrap_or("body");

        shape.geometry = master_shapes
            .iter()
            .flatten()
            .find(|m| {
                m.placeholder
                    .as_ref()
                    .is_some_and(|mp| mp.ph_type == base_type)
            })
            .and_then(|m| m.geometry);
    }

    Ok(())
}

/// Target of the first relationship of `part` whose type ends with `suffix`.
fn related_part(document: &PptxDocument, part: &str, suffix: &str) -> Result<Option<String>> {
    Ok(document
        .part_relationships(part)?
        .into_iter()
        .find(|r| r.rel_type.ends_with(suffix))
        .map(|r| resolve_target(part, &r.target)))
}

/// Master placeholder type a layout placeholder type inherits from.
fn base_placeholder_type(ph_type: &str) -> &'static str {
    match ph_type {
        "title" | "ctrTitle" => "title",
        "dt" => "dt",
        "ftr" => "ftr",
        "sldNum" => "sldNum",
        _ => "body",
    }
}
