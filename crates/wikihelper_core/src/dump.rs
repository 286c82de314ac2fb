use std::borrow::Cow;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use quick_xml::Reader;
use quick_xml::events::Event;
use serde::Serialize;
use tracing::debug;

/// A page of a MediaWiki XML dump reduced to what the extractors need.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DumpPage {
    pub title: String,
    /// Text of the last `<revision>` in document order, if it carried a `<text>` element.
    pub latest_text: Option<String>,
    pub revisions: usize,
}

#[derive(Debug, Default)]
struct PageBuilder {
    title: String,
    revisions: usize,
    revision_text: Option<String>,
    latest_text: Option<String>,
}

impl PageBuilder {
    fn finish(self) -> DumpPage {
        DumpPage {
            title: self.title,
            latest_text: self.latest_text,
            revisions: self.revisions,
        }
    }
}

pub fn read_dump_file(path: &Path) -> Result<Vec<DumpPage>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read dump {}", path.display()))?;
    read_pages(&content).with_context(|| format!("failed to parse dump {}", path.display()))
}

/// Stream `<page>` elements out of a MediaWiki export document.
pub fn read_pages(xml: &str) -> Result<Vec<DumpPage>> {
    let xml = normalize_line_endings(xml);
    let mut reader = Reader::from_str(&xml);
    let mut stack: Vec<Vec<u8>> = Vec::new();
    let mut pages = Vec::new();
    let mut current: Option<PageBuilder> = None;

    loop {
        let event = reader
            .read_event()
            .with_context(|| format!("malformed XML near byte {}", reader.buffer_position()))?;
        match event {
            Event::Start(start) => {
                let name = start.local_name().as_ref().to_vec();
                open_element(&mut current, &stack, &name, false);
                stack.push(name);
            }
            Event::Empty(start) => {
                let name = start.local_name().as_ref().to_vec();
                open_element(&mut current, &stack, &name, true);
            }
            Event::End(_) => {
                let Some(name) = stack.pop() else {
                    continue;
                };
                match name.as_slice() {
                    b"page" => {
                        if let Some(page) = current.take() {
                            debug!(title = %page.title, revisions = page.revisions, "read page");
                            pages.push(page.finish());
                        }
                    }
                    b"revision" => {
                        if let Some(page) = current.as_mut() {
                            page.latest_text = page.revision_text.take();
                        }
                    }
                    _ => {}
                }
            }
            Event::Text(text) => {
                if let Some(target) = text_target(&mut current, &stack) {
                    target.push_str(&text.unescape()?);
                }
            }
            Event::CData(data) => {
                if let Some(target) = text_target(&mut current, &stack) {
                    target.push_str(&String::from_utf8_lossy(&data));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(pages)
}

/// XML line-end handling: `\r\n` and lone `\r` both become `\n` before parsing.
fn normalize_line_endings(xml: &str) -> Cow<'_, str> {
    if xml.contains('\r') {
        Cow::Owned(xml.replace("\r\n", "\n").replace('\r', "\n"))
    } else {
        Cow::Borrowed(xml)
    }
}

fn open_element(current: &mut Option<PageBuilder>, stack: &[Vec<u8>], name: &[u8], empty: bool) {
    let parent = stack.last().map(Vec::as_slice);
    match (parent, name) {
        (_, b"page") if !empty => *current = Some(PageBuilder::default()),
        (Some(b"page"), b"revision") => {
            if let Some(page) = current.as_mut() {
                page.revisions += 1;
                page.revision_text = None;
                if empty {
                    page.latest_text = None;
                }
            }
        }
        (Some(b"revision"), b"text") => {
            if let Some(page) = current.as_mut() {
                page.revision_text = Some(String::new());
            }
        }
        _ => {}
    }
}

fn text_target<'a>(current: &'a mut Option<PageBuilder>, stack: &[Vec<u8>]) -> Option<&'a mut String> {
    let page = current.as_mut()?;
    match stack {
        [.., parent, leaf] if parent.as_slice() == b"page" && leaf.as_slice() == b"title" => {
            Some(&mut page.title)
        }
        [.., parent, leaf] if parent.as_slice() == b"revision" && leaf.as_slice() == b"text" => {
            page.revision_text.as_mut()
        }
        _ => None,
    }
}
