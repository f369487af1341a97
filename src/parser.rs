use crate::config::{
    ARTICLE_NAME_PREFIX_BLACKLIST, BYTE_STREAMER_BUFFER_SIZE, EXPORT_NAMESPACE_PREFIX,
    REDIRECT_SIGIL,
};
use crate::decompress::ByteStreamer;
use crate::models::LinkPair;
use anyhow::{bail, Context, Result};
use once_cell::sync::Lazy;
use quick_xml::events::Event;
use quick_xml::name::ResolveResult;
use quick_xml::reader::NsReader;
use regex::Regex;
use std::collections::VecDeque;
use std::fs::File;
use std::io::BufRead;
use std::path::Path;
use tracing::debug;

/// `[[Target]]` or `[[Target|label]]`; the target stops at the first pipe or bracket.
pub static LINK_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[\[([^\[\]|]+)(?:\|[^\[\]]*)?\]\]").unwrap());

#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Elements count only when their namespace URI starts with this
    pub namespace_prefix: String,
    pub blacklist: Vec<String>,
    pub redirect_sigil: String,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            namespace_prefix: EXPORT_NAMESPACE_PREFIX.to_string(),
            blacklist: ARTICLE_NAME_PREFIX_BLACKLIST
                .iter()
                .map(|p| p.to_string())
                .collect(),
            redirect_sigil: REDIRECT_SIGIL.to_string(),
        }
    }
}

impl ExtractorConfig {
    pub fn with_blacklist(mut self, prefixes: Vec<String>) -> Self {
        self.blacklist = prefixes;
        self
    }

    pub fn is_blacklisted(&self, title: &str) -> bool {
        self.blacklist.iter().any(|p| title.starts_with(p.as_str()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    Page,
    Title,
    Text,
}

/// One parser event, detached from the read buffer.
enum Step {
    Open(Tag),
    Empty(Tag),
    Close(Tag),
    Text(String),
    Eof,
    Other,
}

fn tag_for(in_export_ns: bool, local_name: &[u8]) -> Option<Tag> {
    if !in_export_ns {
        return None;
    }
    match local_name {
        b"page" => Some(Tag::Page),
        b"title" => Some(Tag::Title),
        b"text" => Some(Tag::Text),
        _ => None,
    }
}

#[derive(Default)]
struct PageState {
    title: Option<String>,
    body: Option<String>,
    blacklisted: bool,
}

/// Pulls `(source, target)` link pairs out of a MediaWiki XML export.
///
/// The sequence is lazy and single-pass: bytes are only pulled from the
/// underlying reader when the queue of links from the last finished page runs
/// dry. Pages whose title is blacklisted or whose body is a redirect yield
/// nothing. After the first error the iterator is fused.
pub struct LinkExtractor<R: BufRead> {
    reader: NsReader<R>,
    buf: Vec<u8>,
    config: ExtractorConfig,
    page: Option<PageState>,
    capture: Option<(Tag, String)>,
    queue: VecDeque<LinkPair>,
    done: bool,
    pages_seen: u64,
    pages_skipped: u64,
}

impl LinkExtractor<ByteStreamer<File>> {
    /// Opens a bzip2-compressed export for streaming link extraction.
    pub fn open(path: &str, config: ExtractorConfig) -> Result<Self> {
        Self::open_with_window(path, BYTE_STREAMER_BUFFER_SIZE, config)
    }

    pub fn open_with_window(path: &str, window_size: usize, config: ExtractorConfig) -> Result<Self> {
        let streamer = ByteStreamer::open(Path::new(path), window_size)
            .with_context(|| format!("Failed to open archive: {}", path))?;
        Ok(Self::new(streamer, config))
    }
}

impl<R: BufRead> LinkExtractor<R> {
    pub fn new(source: R, config: ExtractorConfig) -> Self {
        Self {
            reader: NsReader::from_reader(source),
            buf: Vec::new(),
            config,
            page: None,
            capture: None,
            queue: VecDeque::new(),
            done: false,
            pages_seen: 0,
            pages_skipped: 0,
        }
    }

    pub fn pages_seen(&self) -> u64 {
        self.pages_seen
    }

    /// Pages excluded by the blacklist or redirect rule
    pub fn pages_skipped(&self) -> u64 {
        self.pages_skipped
    }

    /// Handles one XML event. Finished pages push their links onto the queue.
    fn advance(&mut self) -> Result<()> {
        self.buf.clear();
        let position = self.reader.buffer_position();
        let capturing = self.capture.is_some();
        let prefix = self.config.namespace_prefix.as_bytes();

        let step = {
            let (resolved, event) = self
                .reader
                .read_resolved_event_into(&mut self.buf)
                .with_context(|| format!("Malformed XML near byte {}", position))?;
            let in_ns = matches!(&resolved, ResolveResult::Bound(ns) if ns.as_ref().starts_with(prefix));

            match event {
                Event::Start(e) => tag_for(in_ns, e.local_name().as_ref()).map_or(Step::Other, Step::Open),
                Event::Empty(e) => tag_for(in_ns, e.local_name().as_ref()).map_or(Step::Other, Step::Empty),
                Event::End(e) => tag_for(in_ns, e.local_name().as_ref()).map_or(Step::Other, Step::Close),
                Event::Text(t) if capturing => {
                    Step::Text(t.unescape().context("Invalid escape in element text")?.into_owned())
                }
                Event::CData(c) if capturing => Step::Text(
                    String::from_utf8(c.into_inner().into_owned()).context("CDATA is not valid UTF-8")?,
                ),
                Event::Eof => Step::Eof,
                _ => Step::Other,
            }
        };

        match step {
            Step::Open(Tag::Page) => {
                self.page = Some(PageState::default());
                self.capture = None;
            }
            Step::Open(field) => {
                if self.page.as_ref().is_some_and(|p| !p.blacklisted) {
                    self.capture = Some((field, String::new()));
                }
            }
            Step::Empty(Tag::Page) => {}
            Step::Empty(field) => self.finish_field(field, String::new())?,
            Step::Close(Tag::Page) => self.finish_page()?,
            Step::Close(field) => {
                if let Some((open, text)) = self.capture.take() {
                    if open == field {
                        self.finish_field(field, text)?;
                    }
                }
            }
            Step::Text(text) => {
                if let Some((_, captured)) = self.capture.as_mut() {
                    captured.push_str(&text);
                }
            }
            Step::Eof => {
                self.done = true;
                if self.page.is_some() {
                    bail!("Unexpected structure: input ended inside a page");
                }
                debug!(
                    pages = self.pages_seen,
                    skipped = self.pages_skipped,
                    "Reached end of export"
                );
            }
            Step::Other => {}
        }

        Ok(())
    }

    fn finish_field(&mut self, field: Tag, text: String) -> Result<()> {
        let Some(page) = self.page.as_mut() else {
            return Ok(());
        };
        if page.blacklisted {
            return Ok(());
        }

        match field {
            Tag::Title => {
                if page.title.is_some() {
                    bail!("Unexpected structure: page has more than one title");
                }
                if self.config.is_blacklisted(&text) {
                    page.blacklisted = true;
                }
                page.title = Some(text);
            }
            Tag::Text => {
                if page.body.is_some() {
                    bail!(
                        "Unexpected structure: page {:?} has more than one text element",
                        page.title.as_deref().unwrap_or_default()
                    );
                }
                let body = text.trim();
                if body.starts_with(self.config.redirect_sigil.as_str()) {
                    page.blacklisted = true;
                }
                page.body = Some(body.to_string());
            }
            Tag::Page => {}
        }
        Ok(())
    }

    fn finish_page(&mut self) -> Result<()> {
        self.capture = None;
        let Some(page) = self.page.take() else {
            return Ok(());
        };
        self.pages_seen += 1;

        if page.blacklisted {
            self.pages_skipped += 1;
            debug!(title = page.title.as_deref().unwrap_or_default(), "Skipping page");
            return Ok(());
        }

        let Some(title) = page.title else {
            bail!("Unexpected structure: page closed without a title");
        };
        let Some(body) = page.body else {
            bail!("Unexpected structure: page {:?} closed without a text element", title);
        };

        for caps in LINK_REGEX.captures_iter(&body) {
            let target = caps[1].replace('\n', "");
            if target.is_empty() {
                continue;
            }
            self.queue.push_back(LinkPair::new(title.as_str(), target));
        }
        Ok(())
    }
}

impl<R: BufRead> Iterator for LinkExtractor<R> {
    type Item = Result<LinkPair>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(pair) = self.queue.pop_front() {
                return Some(Ok(pair));
            }
            if self.done {
                return None;
            }
            if let Err(e) = self.advance() {
                self.done = true;
                self.queue.clear();
                return Some(Err(e));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NS: &str = "http://www.mediawiki.org/xml/export-0.10/";

    fn page(title: &str, text: &str) -> String {
        format!(
            "<page><title>{title}</title><ns>0</ns><id>1</id><revision><id>2</id><text xml:space=\"preserve\">{text}</text></revision></page>"
        )
    }

    fn export(pages: &[String]) -> String {
        format!(
            "<mediawiki xmlns=\"{NS}\" version=\"0.10\"><siteinfo><sitename>Wikipedia</sitename></siteinfo>{}</mediawiki>",
            pages.concat()
        )
    }

    fn extract(xml: &str) -> Result<Vec<(String, String)>> {
        LinkExtractor::new(xml.as_bytes(), ExtractorConfig::default())
            .map(|r| r.map(|p| (p.source, p.target)))
            .collect()
    }

    fn pairs(expected: &[(&str, &str)]) -> Vec<(String, String)> {
        expected
            .iter()
            .map(|(s, t)| (s.to_string(), t.to_string()))
            .collect()
    }

    #[test]
    fn two_page_example() {
        let xml = export(&[
            page("A", "See [[B]] and [[C|see C]]."),
            page("B", "Back to [[A]]"),
        ]);
        assert_eq!(
            extract(&xml).unwrap(),
            pairs(&[("A", "B"), ("A", "C"), ("B", "A")])
        );
    }

    #[test]
    fn blacklisted_title_yields_nothing() {
        let xml = export(&[page("Template:Infobox", "[[X]]")]);
        assert!(extract(&xml).unwrap().is_empty());
    }

    #[test]
    fn every_default_prefix_is_skipped() {
        let pages: Vec<String> = ARTICLE_NAME_PREFIX_BLACKLIST
            .iter()
            .map(|p| page(&format!("{p}Thing"), "[[X]]"))
            .collect();
        assert!(extract(&export(&pages)).unwrap().is_empty());
    }

    #[test]
    fn redirect_yields_nothing() {
        let xml = export(&[page("Old", "#REDIRECT [[Target]]")]);
        assert!(extract(&xml).unwrap().is_empty());
    }

    #[test]
    fn redirect_detected_after_trimming() {
        let xml = export(&[page("Old", "\n   #REDIRECT [[Target]]\n")]);
        assert!(extract(&xml).unwrap().is_empty());
    }

    #[test]
    fn empty_body_is_valid() {
        let xml = export(&[page("Empty", ""), page("A", "[[B]]")]);
        assert_eq!(extract(&xml).unwrap(), pairs(&[("A", "B")]));
    }

    #[test]
    fn self_closing_text_is_an_empty_body() {
        let xml = export(&[
            "<page><title>Blank</title><revision><text bytes=\"0\" /></revision></page>".to_string(),
        ]);
        assert!(extract(&xml).unwrap().is_empty());
    }

    #[test]
    fn newlines_in_targets_are_stripped() {
        let xml = export(&[page("A", "[[New\nYork]]")]);
        assert_eq!(extract(&xml).unwrap(), pairs(&[("A", "NewYork")]));
    }

    #[test]
    fn escaped_text_is_unescaped() {
        let xml = export(&[page("AT&amp;T", "[[Bell &amp; Howell|B&amp;H]]")]);
        assert_eq!(extract(&xml).unwrap(), pairs(&[("AT&T", "Bell & Howell")]));
    }

    #[test]
    fn links_nested_in_captions_are_found() {
        let xml = export(&[page("A", "[[File:x.jpg|thumb|see [[B]]]]")]);
        assert_eq!(extract(&xml).unwrap(), pairs(&[("A", "B")]));
    }

    #[test]
    fn elements_outside_export_namespace_are_ignored() {
        let xml = format!(
            "<mediawiki xmlns=\"http://example.com/other\">{}</mediawiki>",
            page("A", "[[B]]")
        );
        assert!(extract(&xml).unwrap().is_empty());
    }

    #[test]
    fn newer_export_versions_are_accepted() {
        let xml = format!(
            "<mediawiki xmlns=\"http://www.mediawiki.org/xml/export-0.11/\">{}</mediawiki>",
            page("A", "[[B]]")
        );
        assert_eq!(extract(&xml).unwrap(), pairs(&[("A", "B")]));
    }

    #[test]
    fn missing_title_fails_fast() {
        let xml = export(&["<page><revision><text>[[B]]</text></revision></page>".to_string()]);
        let err = extract(&xml).unwrap_err();
        assert!(err.to_string().contains("without a title"));
    }

    #[test]
    fn missing_text_fails_fast() {
        let xml = export(&["<page><title>A</title></page>".to_string()]);
        let err = extract(&xml).unwrap_err();
        assert!(err.to_string().contains("without a text element"));
    }

    #[test]
    fn blacklisted_page_without_text_is_not_an_error() {
        let xml = export(&["<page><title>User:Someone</title></page>".to_string()]);
        assert!(extract(&xml).unwrap().is_empty());
    }

    #[test]
    fn iterator_is_fused_after_error() {
        let xml = export(&[
            "<page><title>A</title></page>".to_string(),
            page("B", "[[C]]"),
        ]);
        let mut extractor = LinkExtractor::new(xml.as_bytes(), ExtractorConfig::default());
        assert!(extractor.next().unwrap().is_err());
        assert!(extractor.next().is_none());
    }

    #[test]
    fn truncated_document_inside_page_is_an_error() {
        let xml = format!("<mediawiki xmlns=\"{NS}\"><page><title>A</title>");
        assert!(extract(&xml).is_err());
    }

    #[test]
    fn custom_blacklist_replaces_default() {
        let xml = export(&[page("Draft:A", "[[B]]"), page("User:C", "[[D]]")]);
        let config = ExtractorConfig::default().with_blacklist(vec!["Draft:".to_string()]);
        let links: Vec<_> = LinkExtractor::new(xml.as_bytes(), config)
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(links, vec![LinkPair::new("User:C", "D")]);
    }

    #[test]
    fn counts_seen_and_skipped_pages() {
        let xml = export(&[page("A", "[[B]]"), page("Old", "#REDIRECT [[A]]"), page("WP:X", "")]);
        let mut extractor = LinkExtractor::new(xml.as_bytes(), ExtractorConfig::default());
        while extractor.next().is_some() {}
        assert_eq!(extractor.pages_seen(), 3);
        assert_eq!(extractor.pages_skipped(), 2);
    }
}
