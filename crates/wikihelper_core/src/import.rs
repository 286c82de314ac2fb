use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::{DEFAULT_IMPORT_SUFFIX, DEFAULT_INTERWIKI, HelperConfig};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TweakOptions {
    /// Interwiki prefix the permalink and user links point at.
    pub interwiki: String,
    pub output_suffix: String,
}

impl Default for TweakOptions {
    fn default() -> Self {
        Self {
            interwiki: DEFAULT_INTERWIKI.to_string(),
            output_suffix: DEFAULT_IMPORT_SUFFIX.to_string(),
        }
    }
}

impl TweakOptions {
    pub fn from_config(config: &HelperConfig) -> Self {
        Self {
            interwiki: config.interwiki(),
            output_suffix: config.import_suffix().to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TweakReport {
    pub revisions: usize,
    pub comments_added: usize,
    pub comments_prefixed: usize,
}

pub fn attribution_phrase(interwiki: &str, revision_id: &str, contributor: &str) -> String {
    format!(
        "imported from [[{interwiki}:Special:Permalink/{revision_id}]] by [[{interwiki}:User:{contributor}|{contributor}]]"
    )
}

/// `export.xml` -> `export-FOR-IMPORT.xml`: the last four characters give way to the suffix.
pub fn tweaked_filename(input: &Path, suffix: &str) -> PathBuf {
    let name = input.to_string_lossy();
    let keep = name
        .char_indices()
        .rev()
        .nth(3)
        .map(|(offset, _)| offset)
        .unwrap_or(0);
    PathBuf::from(format!("{}{suffix}", &name[..keep]))
}

pub fn tweak_export_file(input: &Path, output: &Path, options: &TweakOptions) -> Result<TweakReport> {
    let content = fs::read_to_string(input)
        .with_context(|| format!("failed to read export {}", input.display()))?;
    let (tweaked, report) =
        tweak_export(&content, options).with_context(|| format!("failed to tweak {}", input.display()))?;
    fs::write(output, tweaked).with_context(|| format!("failed to write {}", output.display()))?;
    info!(
        revisions = report.revisions,
        output = %output.display(),
        "wrote attributed export"
    );
    Ok(report)
}

/// Rewrite every `<revision>` comment to carry attribution; everything else is copied verbatim.
pub fn tweak_export(xml: &str, options: &TweakOptions) -> Result<(String, TweakReport)> {
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Vec::new());
    let mut report = TweakReport::default();
    let mut revision: Option<Vec<Event<'static>>> = None;
    let mut nesting = 0usize;

    loop {
        let event = reader
            .read_event()
            .with_context(|| format!("malformed XML near byte {}", reader.buffer_position()))?;
        if let Event::Eof = event {
            break;
        }

        if let Some(buffer) = revision.as_mut() {
            let closes_revision = match &event {
                Event::Start(_) => {
                    nesting += 1;
                    false
                }
                Event::End(_) if nesting == 0 => true,
                Event::End(_) => {
                    nesting -= 1;
                    false
                }
                _ => false,
            };
            buffer.push(event.into_owned());
            if closes_revision && let Some(events) = revision.take() {
                for event in attribute_revision(events, options, &mut report)? {
                    writer.write_event(event)?;
                }
            }
            continue;
        }

        match event {
            Event::Start(start) if start.local_name().as_ref() == b"revision" => {
                nesting = 0;
                revision = Some(vec![Event::Start(start.into_owned())]);
            }
            Event::Empty(start) if start.local_name().as_ref() == b"revision" => {
                bail!("revision #{} has no <id>", report.revisions + 1);
            }
            other => writer.write_event(other)?,
        }
    }

    let output = String::from_utf8(writer.into_inner()).context("tweaked export is not UTF-8")?;
    Ok((output, report))
}

struct CommentSpan {
    tag: BytesStart<'static>,
    first: usize,
    last: usize,
}

#[derive(Default)]
struct RevisionScan {
    id: Option<String>,
    username: Option<String>,
    ip: Option<String>,
    comment: Option<CommentSpan>,
    comment_text: String,
    contributor_indent: Option<usize>,
    insert_after: Option<usize>,
}

fn path_is(path: &[Vec<u8>], expected: &[&[u8]]) -> bool {
    path.len() == expected.len()
        && path
            .iter()
            .zip(expected)
            .all(|(segment, expected)| segment.as_slice() == *expected)
}

fn is_whitespace_text(event: &Event<'_>) -> bool {
    matches!(event, Event::Text(text) if text.iter().all(u8::is_ascii_whitespace))
}

/// Walk the children of one buffered `<revision>`; `events` starts with its start tag and ends with its end tag.
fn scan_revision(events: &[Event<'static>]) -> Result<RevisionScan> {
    let mut scan = RevisionScan::default();
    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut comment_start: Option<(usize, BytesStart<'static>)> = None;
    let inner = events.len().saturating_sub(1);

    for (index, event) in events.iter().enumerate().take(inner).skip(1) {
        match event {
            Event::Start(start) | Event::Empty(start) => {
                let empty = matches!(event, Event::Empty(_));
                let name = start.local_name().as_ref().to_vec();
                if path.is_empty() {
                    match name.as_slice() {
                        b"contributor" => {
                            if is_whitespace_text(&events[index - 1]) {
                                scan.contributor_indent = Some(index - 1);
                            }
                            if empty {
                                scan.insert_after = Some(index);
                            }
                        }
                        b"minor" if empty => scan.insert_after = Some(index),
                        b"comment" if empty => {
                            scan.comment = Some(CommentSpan {
                                tag: start.clone(),
                                first: index,
                                last: index,
                            });
                        }
                        b"comment" => comment_start = Some((index, start.clone())),
                        b"id" => scan.id = Some(String::new()),
                        _ => {}
                    }
                } else if path_is(&path, &[b"contributor"]) {
                    match name.as_slice() {
                        b"username" => scan.username = Some(String::new()),
                        b"ip" => scan.ip = Some(String::new()),
                        _ => {}
                    }
                }
                if !empty {
                    path.push(name);
                }
            }
            Event::End(_) => {
                let name = path.pop().unwrap_or_default();
                if path.is_empty() {
                    match name.as_slice() {
                        b"contributor" | b"minor" => scan.insert_after = Some(index),
                        b"comment" => {
                            if let Some((first, tag)) = comment_start.take() {
                                scan.comment = Some(CommentSpan {
                                    tag,
                                    first,
                                    last: index,
                                });
                            }
                        }
                        _ => {}
                    }
                }
            }
            Event::Text(text) => {
                let value = text.unescape()?;
                append_text(&mut scan, &path, &value);
            }
            Event::CData(data) => {
                append_text(&mut scan, &path, &String::from_utf8_lossy(data));
            }
            _ => {}
        }
    }

    Ok(scan)
}

fn append_text(scan: &mut RevisionScan, path: &[Vec<u8>], value: &str) {
    let target = if path_is(path, &[b"id"]) {
        scan.id.as_mut()
    } else if path_is(path, &[b"contributor", b"username"]) {
        scan.username.as_mut()
    } else if path_is(path, &[b"contributor", b"ip"]) {
        scan.ip.as_mut()
    } else if path_is(path, &[b"comment"]) {
        Some(&mut scan.comment_text)
    } else {
        None
    };
    if let Some(target) = target {
        target.push_str(value);
    }
}

fn comment_events(tag: BytesStart<'static>, text: &str) -> [Event<'static>; 3] {
    let end = tag.to_end().into_owned();
    [
        Event::Start(tag),
        Event::Text(BytesText::new(text).into_owned()),
        Event::End(end),
    ]
}

fn attribute_revision(
    events: Vec<Event<'static>>,
    options: &TweakOptions,
    report: &mut TweakReport,
) -> Result<Vec<Event<'static>>> {
    let scan = scan_revision(&events)?;
    let revision_id = scan
        .id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| anyhow!("revision #{} has no <id>", report.revisions + 1))?
        .to_string();
    let contributor = scan
        .username
        .as_deref()
        .or(scan.ip.as_deref())
        .ok_or_else(|| anyhow!("revision {revision_id} has no contributor username or ip"))?;
    let phrase = attribution_phrase(&options.interwiki, &revision_id, contributor);
    report.revisions += 1;

    let mut output = Vec::with_capacity(events.len() + 4);
    match scan.comment {
        Some(span) => {
            let text = format!("{phrase}: {}", scan.comment_text);
            debug!(revision = %revision_id, comment = %text, "prefixed comment");
            for (index, event) in events.into_iter().enumerate() {
                if (span.first..=span.last).contains(&index) {
                    if index == span.first {
                        output.extend(comment_events(span.tag.clone(), &text));
                    }
                    continue;
                }
                output.push(event);
            }
            report.comments_prefixed += 1;
        }
        None => {
            let insert_after = scan
                .insert_after
                .ok_or_else(|| anyhow!("revision {revision_id} has no <contributor>"))?;
            let indent = scan.contributor_indent.map(|index| events[index].clone());
            debug!(revision = %revision_id, comment = %phrase, "added comment");
            for (index, event) in events.into_iter().enumerate() {
                output.push(event);
                if index == insert_after {
                    if let Some(indent) = indent.clone() {
                        output.push(indent);
                    }
                    output.extend(comment_events(BytesStart::new("comment"), &phrase));
                }
            }
            report.comments_added += 1;
        }
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dump::read_pages;
    use tempfile::tempdir;

    const EXPORT: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<mediawiki xmlns="http://www.mediawiki.org/xml/export-0.11/" version="0.11" xml:lang="en">
  <page>
    <title>Boku no Kokoro no Yabai Yatsu</title>
    <ns>0</ns>
    <id>58613456</id>
    <revision>
      <id>123456</id>
      <timestamp>2018-08-01T10:00:00Z</timestamp>
      <contributor>
        <username>Alice</username>
        <id>99</id>
      </contributor>
      <model>wikitext</model>
      <format>text/x-wiki</format>
      <text bytes="5" xml:space="preserve">Hello</text>
      <sha1>abc</sha1>
    </revision>
    <revision>
      <id>123457</id>
      <parentid>123456</parentid>
      <timestamp>2018-08-02T10:00:00Z</timestamp>
      <contributor>
        <ip>192.0.2.1</ip>
      </contributor>
      <minor/>
      <comment>fix typo &amp; tidy</comment>
      <model>wikitext</model>
      <format>text/x-wiki</format>
      <text bytes="6" xml:space="preserve">Hello!</text>
      <sha1>def</sha1>
    </revision>
  </page>
</mediawiki>
"#;

    fn comments(xml: &str) -> Vec<String> {
        let mut reader = Reader::from_str(xml);
        let mut inside = false;
        let mut found = Vec::new();
        loop {
            match reader.read_event().expect("event") {
                Event::Start(start) if start.local_name().as_ref() == b"comment" => {
                    inside = true;
                    found.push(String::new());
                }
                Event::End(end) if end.local_name().as_ref() == b"comment" => inside = false,
                Event::Text(text) if inside => {
                    if let Some(last) = found.last_mut() {
                        last.push_str(&text.unescape().expect("unescape"));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }
        found
    }

    #[test]
    fn attribution_phrase_links_permalink_and_user() {
        assert_eq!(
            attribution_phrase("wikipedia", "123456", "Alice"),
            "imported from [[wikipedia:Special:Permalink/123456]] by [[wikipedia:User:Alice|Alice]]"
        );
    }

    #[test]
    fn adds_and_prefixes_comments() {
        let (tweaked, report) = tweak_export(EXPORT, &TweakOptions::default()).expect("tweak");
        assert_eq!(
            report,
            TweakReport {
                revisions: 2,
                comments_added: 1,
                comments_prefixed: 1,
            }
        );
        assert_eq!(
            comments(&tweaked),
            vec![
                "imported from [[wikipedia:Special:Permalink/123456]] by [[wikipedia:User:Alice|Alice]]"
                    .to_string(),
                "imported from [[wikipedia:Special:Permalink/123457]] by [[wikipedia:User:192.0.2.1|192.0.2.1]]: fix typo & tidy"
                    .to_string(),
            ]
        );
    }

    #[test]
    fn new_comment_follows_contributor_with_sibling_indent() {
        let (tweaked, _) = tweak_export(EXPORT, &TweakOptions::default()).expect("tweak");
        assert!(tweaked.contains(
            "      </contributor>\n      <comment>imported from [[wikipedia:Special:Permalink/123456]]"
        ));
        assert!(tweaked.contains("Alice]]</comment>\n      <model>wikitext</model>"));
    }

    #[test]
    fn leaves_everything_else_untouched() {
        let (tweaked, _) = tweak_export(EXPORT, &TweakOptions::default()).expect("tweak");
        assert!(tweaked.starts_with("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<mediawiki xmlns="));
        assert!(tweaked.contains("<text bytes=\"6\" xml:space=\"preserve\">Hello!</text>"));
        assert!(tweaked.contains("<minor/>"));

        let original = read_pages(EXPORT).expect("pages");
        let rewritten = read_pages(&tweaked).expect("pages");
        assert_eq!(original, rewritten);
    }

    #[test]
    fn fills_empty_comment_element() {
        let xml = "<mediawiki><page><revision><id>5</id><contributor><username>Bob</username></contributor><comment deleted=\"deleted\"/></revision></page></mediawiki>";
        let (tweaked, report) = tweak_export(xml, &TweakOptions::default()).expect("tweak");
        assert_eq!(report.comments_prefixed, 1);
        assert!(tweaked.contains(
            "<comment deleted=\"deleted\">imported from [[wikipedia:Special:Permalink/5]] by [[wikipedia:User:Bob|Bob]]: </comment>"
        ));
    }

    #[test]
    fn uses_configured_interwiki() {
        let xml = "<mediawiki><page><revision><id>5</id><contributor><username>Bob</username></contributor></revision></page></mediawiki>";
        let options = TweakOptions {
            interwiki: "en".to_string(),
            ..TweakOptions::default()
        };
        let (tweaked, _) = tweak_export(xml, &options).expect("tweak");
        assert!(tweaked.contains(
            "</contributor><comment>imported from [[en:Special:Permalink/5]] by [[en:User:Bob|Bob]]</comment></revision>"
        ));
    }

    #[test]
    fn revision_without_contributor_name_aborts() {
        let xml = "<mediawiki><page><revision><id>5</id><contributor deleted=\"deleted\"/></revision></page></mediawiki>";
        let error = tweak_export(xml, &TweakOptions::default()).expect_err("must fail");
        assert!(error.to_string().contains("revision 5"));
    }

    #[test]
    fn revision_without_id_aborts() {
        let xml = "<mediawiki><page><revision><contributor><ip>::1</ip></contributor></revision></page></mediawiki>";
        assert!(tweak_export(xml, &TweakOptions::default()).is_err());
    }

    #[test]
    fn empty_revision_element_aborts() {
        let xml = "<mediawiki><page><title>X</title><revision><id>1</id><contributor><ip>::1</ip></contributor></revision><revision/></page></mediawiki>";
        let error = tweak_export(xml, &TweakOptions::default()).expect_err("must fail");
        assert!(error.to_string().contains("revision #2 has no <id>"));
    }

    #[test]
    fn malformed_xml_aborts() {
        let xml = "<mediawiki><page><revision><id>5</revision></page></mediawiki>";
        assert!(tweak_export(xml, &TweakOptions::default()).is_err());
    }

    #[test]
    fn tweaked_filename_replaces_extension() {
        assert_eq!(
            tweaked_filename(Path::new("export.xml"), "-FOR-IMPORT.xml"),
            PathBuf::from("export-FOR-IMPORT.xml")
        );
        assert_eq!(
            tweaked_filename(Path::new("dir/Wikipedia-2025.xml"), "-FOR-IMPORT.xml"),
            PathBuf::from("dir/Wikipedia-2025-FOR-IMPORT.xml")
        );
        assert_eq!(
            tweaked_filename(Path::new("abc"), "-FOR-IMPORT.xml"),
            PathBuf::from("-FOR-IMPORT.xml")
        );
    }

    #[test]
    fn tweak_export_file_writes_output() {
        let temp = tempdir().expect("tempdir");
        let input = temp.path().join("export.xml");
        fs::write(&input, EXPORT).expect("write export");
        let output = tweaked_filename(&input, DEFAULT_IMPORT_SUFFIX);

        let report = tweak_export_file(&input, &output, &TweakOptions::default()).expect("tweak");
        assert_eq!(report.revisions, 2);
        let written = fs::read_to_string(&output).expect("read output");
        assert_eq!(comments(&written).len(), 2);
        assert_eq!(fs::read_to_string(&input).expect("read input"), EXPORT);
    }
}
