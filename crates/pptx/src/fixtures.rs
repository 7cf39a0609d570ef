//! In-memory PPTX packages for tests.

use std::io::{Cursor, Write};
use zip::write::FileOptions;
use zip::ZipWriter;

const NS: &str = r#"xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main""#;
const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

pub(crate) type Emu = (i64, i64, i64, i64);

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn xfrm(prefix: &str, (x, y, cx, cy): Emu) -> String {
    format!(
        r#"<{p}:xfrm><a:off x="{x}" y="{y}"/><a:ext cx="{cx}" cy="{cy}"/></{p}:xfrm>"#,
        p = prefix
    )
}

/// A text body with one paragraph per line and bold 24pt runs.
pub(crate) fn text_body(text: &str) -> String {
    let paragraphs: String = text
        .split('\n')
        .map(|line| {
            format!(
                r#"<a:p><a:pPr algn="ctr"/><a:r><a:rPr lang="en-US" sz="2400" b="1"/><a:t>{}</a:t></a:r></a:p>"#,
                escape(line)
            )
        })
        .collect();
    format!(r#"<p:txBody><a:bodyPr wrap="square"/><a:lstStyle/>{}</p:txBody>"#, paragraphs)
}

pub(crate) fn text_box(id: u32, geometry: Emu, text: &str) -> String {
    format!(
        r#"<p:sp><p:nvSpPr><p:cNvPr id="{id}" name="TextBox {id}"/><p:cNvSpPr txBox="1"/><p:nvPr/></p:nvSpPr><p:spPr>{}<a:prstGeom prst="rect"><a:avLst/></a:prstGeom></p:spPr>{}</p:sp>"#,
        xfrm("a", geometry),
        text_body(text)
    )
}

pub(crate) fn auto_shape(id: u32, geometry: Emu, text: &str) -> String {
    format!(
        r#"<p:sp><p:nvSpPr><p:cNvPr id="{id}" name="Rectangle {id}"/><p:cNvSpPr/><p:nvPr/></p:nvSpPr><p:spPr>{}<a:prstGeom prst="rect"><a:avLst/></a:prstGeom></p:spPr>{}</p:sp>"#,
        xfrm("a", geometry),
        text_body(text)
    )
}

/// An `p:sp` with no text body at all.
pub(crate) fn bare_shape(id: u32, geometry: Emu) -> String {
    format!(
        r#"<p:sp><p:nvSpPr><p:cNvPr id="{id}" name="TextBox {id}"/><p:cNvSpPr txBox="1"/><p:nvPr/></p:nvSpPr><p:spPr>{}</p:spPr></p:sp>"#,
        xfrm("a", geometry)
    )
}

pub(crate) fn placeholder(
    id: u32,
    ph_type: &str,
    idx: u32,
    geometry: Option<Emu>,
    text: &str,
) -> String {
    let sp_pr = match geometry {
        Some(g) => format!("<p:spPr>{}</p:spPr>", xfrm("a", g)),
        None => "<p:spPr/>".to_string(),
    };
    format!(
        r#"<p:sp><p:nvSpPr><p:cNvPr id="{id}" name="Placeholder {id}"/><p:cNvSpPr><a:spLocks noGrp="1"/></p:cNvSpPr><p:nvPr><p:ph type="{ph_type}" idx="{idx}"/></p:nvPr></p:nvSpPr>{sp_pr}{}</p:sp>"#,
        text_body(text)
    )
}

pub(crate) fn picture(id: u32, geometry: Emu) -> String {
    format!(
        r#"<p:pic><p:nvPicPr><p:cNvPr id="{id}" name="Picture {id}"/><p:cNvPicPr><a:picLocks noChangeAspect="1"/></p:cNvPicPr><p:nvPr/></p:nvPicPr><p:blipFill><a:blip r:embed="rId9"/><a:stretch><a:fillRect/></a:stretch></p:blipFill><p:spPr>{}<a:prstGeom prst="rect"><a:avLst/></a:prstGeom></p:spPr></p:pic>"#,
        xfrm("a", geometry)
    )
}

pub(crate) fn connector(id: u32, geometry: Emu) -> String {
    format!(
        r#"<p:cxnSp><p:nvCxnSpPr><p:cNvPr id="{id}" name="Connector {id}"/><p:cNvCxnSpPr/><p:nvPr/></p:nvCxnSpPr><p:spPr>{}<a:prstGeom prst="line"><a:avLst/></a:prstGeom></p:spPr></p:cxnSp>"#,
        xfrm("a", geometry)
    )
}

pub(crate) fn table(id: u32, geometry: Emu) -> String {
    format!(
        r#"<p:graphicFrame><p:nvGraphicFramePr><p:cNvPr id="{id}" name="Table {id}"/><p:cNvGraphicFramePr/><p:nvPr/></p:nvGraphicFramePr>{}<a:graphic><a:graphicData uri="http://schemas.openxmlformats.org/drawingml/2006/table"><a:tbl><a:tr h="370840"><a:tc><a:txBody><a:bodyPr/><a:p><a:r><a:t>cell</a:t></a:r></a:p></a:txBody></a:tc></a:tr></a:tbl></a:graphicData></a:graphic></p:graphicFrame>"#,
        xfrm("p", geometry)
    )
}

pub(crate) fn group(id: u32, children: &[String]) -> String {
    format!(
        r#"<p:grpSp><p:nvGrpSpPr><p:cNvPr id="{id}" name="Group {id}"/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="952500" cy="952500"/><a:chOff x="0" y="0"/><a:chExt cx="952500" cy="952500"/></a:xfrm></p:grpSpPr>{}</p:grpSp>"#,
        children.concat()
    )
}

fn sp_tree(root: &str, shapes: &[String]) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<p:{root} {NS}><p:cSld><p:spTree><p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr/>{}</p:spTree></p:cSld></p:{root}>"#,
        shapes.concat()
    )
}

/// A complete slide part around `shapes`.
pub(crate) fn slide_xml(shapes: &[String]) -> String {
    sp_tree("sld", shapes)
}

fn rels(entries: &[(String, &str, String)]) -> String {
    let body: String = entries
        .iter()
        .map(|(id, kind, target)| {
            format!(
                r#"<Relationship Id="{id}" Type="{REL_NS}/{kind}" Target="{target}"/>"#
            )
        })
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">{body}</Relationships>"#
    )
}

/// Builder for a minimal but well-formed presentation package.
pub(crate) struct FixtureDeck {
    width: i64,
    height: i64,
    slides: Vec<Vec<String>>,
    layout: Vec<String>,
    master: Vec<String>,
}

impl FixtureDeck {
    pub(crate) fn new(width: i64, height: i64) -> Self {
        Self {
            width,
            height,
            slides: Vec::new(),
            layout: Vec::new(),
            master: Vec::new(),
        }
    }

    pub(crate) fn slide(mut self, shapes: Vec<String>) -> Self {
        self.slides.push(shapes);
        self
    }

    pub(crate) fn layout(mut self, shapes: Vec<String>) -> Self {
        self.layout = shapes;
        self
    }

    pub(crate) fn master(mut self, shapes: Vec<String>) -> Self {
        self.master = shapes;
        self
    }

    pub(crate) fn build(&self) -> Vec<u8> {
        let mut parts: Vec<(String, String)> = Vec::new();

        let overrides: String = (1..=self.slides.len())
            .map(|n| {
                format!(
                    r#"<Override PartName="/ppt/slides/slide{n}.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.slide+xml"/>"#
                )
            })
            .collect();
        parts.push((
            "[Content_Types].xml".into(),
            format!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/ppt/presentation.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.presentation.main+xml"/>{overrides}</Types>"#
            ),
        ));

        let sld_ids: String = (1..=self.slides.len())
            .map(|n| format!(r#"<p:sldId id="{}" r:id="rId{}"/>"#, 255 + n, n + 1))
            .collect();
        parts.push((
            "ppt/presentation.xml".into(),
            format!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<p:presentation {NS}><p:sldMasterIdLst><p:sldMasterId id="2147483648" r:id="rId1"/></p:sldMasterIdLst><p:sldIdLst>{sld_ids}</p:sldIdLst><p:sldSz cx="{}" cy="{}"/><p:notesSz cx="6858000" cy="9144000"/></p:presentation>"#,
                self.width, self.height
            ),
        ));

        let mut presentation_rels = vec![(
            "rId1".to_string(),
            "slideMaster",
            "slideMasters/slideMaster1.xml".to_string(),
        )];
        for n in 1..=self.slides.len() {
            presentation_rels.push((format!("rId{}", n + 1), "slide", format!("slides/slide{n}.xml")));
        }
        parts.push(("ppt/_rels/presentation.xml.rels".into(), rels(&presentation_rels)));

        for (idx, shapes) in self.slides.iter().enumerate() {
            let n = idx + 1;
            parts.push((format!("ppt/slides/slide{n}.xml"), slide_xml(shapes)));
            parts.push((
                format!("ppt/slides/_rels/slide{n}.xml.rels"),
                rels(&[(
                    "rId1".to_string(),
                    "slideLayout",
                    "../slideLayouts/slideLayout1.xml".to_string(),
                )]),
            ));
        }

        parts.push((
            "ppt/slideLayouts/slideLayout1.xml".into(),
            sp_tree("sldLayout", &self.layout),
        ));
        parts.push((
            "ppt/slideLayouts/_rels/slideLayout1.xml.rels".into(),
            rels(&[(
                "rId1".to_string(),
                "slideMaster",
                "../slideMasters/slideMaster1.xml".to_string(),
            )]),
        ));
        parts.push((
            "ppt/slideMasters/slideMaster1.xml".into(),
            sp_tree("sldMaster", &self.master),
        ));

        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in parts {
            writer.start_file(name, FileOptions::default()).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }
}
