//! Directory listings.
//!
//! A directory without an index page is presented as a listing of its
//! content. There are three formats for this, plain text, HTML, and JSON.
//! Which one is used is negotiated through the request’s `Accept` header.

use std::fmt::Write;
use log::debug;
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use serde::Serialize;
use crate::archive::{AccessError, Archive, DirEntry, EntryKind};
use crate::lookup::web_root_path;


//------------ ListingFormat -------------------------------------------------

/// The formats of a directory listing.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ListingFormat {
    Text,
    Html,
    Json,
}

impl ListingFormat {
    /// All formats in order of our preference.
    pub const ALL: [ListingFormat; 3] = [
        ListingFormat::Text, ListingFormat::Html, ListingFormat::Json
    ];

    /// Returns the media type of the format.
    pub fn media_type(self) -> &'static str {
        match self {
            ListingFormat::Text => "text/plain",
            ListingFormat::Html => "text/html",
            ListingFormat::Json => "application/json",
        }
    }

    /// Picks the best format for the given `Accept` header value.
    ///
    /// Returns `None` if the client doesn’t accept any of our formats.
    pub fn negotiate(accept: Option<&str>) -> Option<Self> {
        let accept = match accept {
            Some(accept) if !accept.trim().is_empty() => accept,
            _ => return Some(ListingFormat::Text),
        };
        let ranges: Vec<_> = accept.split(',').filter_map(
            MediaRange::parse
        ).collect();

        let mut best: Option<(Priority, ListingFormat)> = None;
        for (server_idx, format) in Self::ALL.iter().enumerate() {
            let priority = match Priority::find(
                &ranges, format.media_type(), server_idx
            ) {
                Some(priority) => priority,
                None => continue,
            };
            if best.map(|(best, _)| priority > best).unwrap_or(true) {
                best = Some((priority, *format))
            }
        }
        best.map(|(_, format)| format)
    }
}


//------------ MediaRange ----------------------------------------------------

/// A single media range of an `Accept` header.
#[derive(Clone, Debug)]
struct MediaRange<'a> {
    main: &'a str,
    sub: &'a str,

    /// The quality in thousandths.
    quality: u16,
}

impl<'a> MediaRange<'a> {
    fn parse(value: &'a str) -> Option<Self> {
        let mut params = value.split(';');
        let mut media = params.next()?.trim().splitn(2, '/');
        let main = media.next()?.trim();
        let sub = media.next()?.trim();
        if main.is_empty() || sub.is_empty() {
            return None
        }
        let mut quality = 1000;
        for param in params {
            let mut param = param.splitn(2, '=');
            let name = param.next()?.trim();
            if name.eq_ignore_ascii_case("q") {
                quality = parse_quality(param.next()?.trim())?;
            }
        }
        Some(MediaRange { main, sub, quality })
    }

    /// Returns the specificity if the range matches a media type.
    ///
    /// The specificity is 2 for an exact match, 1 for a `type/*` match, and
    /// 0 for `*/*`.
    fn matches(&self, main: &str, sub: &str) -> Option<u8> {
        if self.main == "*" {
            if self.sub == "*" {
                Some(0)
            }
            else {
                None
            }
        }
        else if !self.main.eq_ignore_ascii_case(main) {
            None
        }
        else if self.sub == "*" {
            Some(1)
        }
        else if self.sub.eq_ignore_ascii_case(sub) {
            Some(2)
        }
        else {
            None
        }
    }
}

/// Parses a quality value into thousandths.
fn parse_quality(value: &str) -> Option<u16> {
    let value: f32 = value.parse().ok()?;
    if !(0. ..=1.).contains(&value) {
        return None
    }
    Some((value * 1000.).round() as u16)
}


//------------ Priority ------------------------------------------------------

/// How much a client wants a certain format.
///
/// Values compare so that the more preferred format is greater.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
struct Priority {
    quality: u16,
    specificity: u8,
    client_order: std::cmp::Reverse<usize>,
    server_order: std::cmp::Reverse<usize>,
}

impl Priority {
    /// Finds the priority of a media type given the client’s ranges.
    ///
    /// The most specific matching range determines the quality. Returns
    /// `None` if no range matches or the quality is zero.
    fn find(
        ranges: &[MediaRange], media_type: &str, server_order: usize
    ) -> Option<Self> {
        let (main, sub) = media_type.split_once('/')?;
        let mut res: Option<Priority> = None;
        for (idx, range) in ranges.iter().enumerate() {
            let specificity = match range.matches(main, sub) {
                Some(specificity) => specificity,
                None => continue,
            };
            if res.map(|res| specificity > res.specificity).unwrap_or(true) {
                res = Some(Priority {
                    quality: range.quality,
                    specificity,
                    client_order: std::cmp::Reverse(idx),
                    server_order: std::cmp::Reverse(server_order),
                })
            }
        }
        res.filter(|res| res.quality > 0)
    }
}


//------------ Rendering -----------------------------------------------------

/// The characters to percent-encode in the links of a listing.
///
/// Entry names never contain a slash, so it can stay.
const HREF_SET: &AsciiSet = &CONTROLS
    .add(b' ').add(b'"').add(b'#').add(b'%').add(b'<').add(b'>')
    .add(b'?').add(b'\\').add(b'^').add(b'`').add(b'{').add(b'|').add(b'}');

/// Renders the listing of a directory.
///
/// The `dir` is the path of the directory in the archive ending in a
/// slash. If the archive has a web root, the directory is read from below
/// it. The `base` is whatever comes before `dir` in the request path, i.e.,
/// the archive’s name if it was picked by the first path segment, or empty
/// otherwise. All links in the listing are relative to the request, so the
/// web root never shows.
pub async fn render(
    format: ListingFormat,
    archive: &dyn Archive,
    dir: &str,
    base: &str,
    web_root: Option<&str>,
) -> Result<String, AccessError> {
    let mut entries = archive.read_dir(
        &web_root_path(web_root, dir)
    ).await?;
    entries.sort_by(|left, right| {
        (left.kind != EntryKind::Directory, &left.name).cmp(
            &(right.kind != EntryKind::Directory, &right.name)
        )
    });
    let path = format!("{}{}", base, dir);
    debug!("Rendering {} entries for '{}'.", entries.len(), path);
    Ok(match format {
        ListingFormat::Text => render_text(&entries),
        ListingFormat::Html => render_html(&path, &entries),
        ListingFormat::Json => render_json(&path, &entries),
    })
}

fn render_text(entries: &[DirEntry]) -> String {
    let mut res = String::new();
    for entry in entries {
        res.push_str(&entry.name);
        if entry.kind == EntryKind::Directory {
            res.push('/');
        }
        res.push('\n');
    }
    res
}

fn render_html(path: &str, entries: &[DirEntry]) -> String {
    let title = escape_html(path);
    let mut res = String::new();
    // Writing to a string never fails.
    let _ = write!(res,
        "<!doctype html>\n\
         <html>\n\
         <head><meta charset=\"utf-8\"><title>Index of {title}</title></head>\n\
         <body>\n\
         <h1>Index of {title}</h1>\n\
         <ul>\n",
        title = title
    );
    if path != "/" {
        res.push_str("<li><a href=\"..\">..</a></li>\n");
    }
    for entry in entries {
        let suffix = if entry.kind == EntryKind::Directory { "/" } else { "" };
        let _ = writeln!(res,
            "<li><a href=\"{href}\">{name}{suffix}</a></li>",
            href = escape_html(&href(path, entry)),
            name = escape_html(&entry.name),
            suffix = suffix
        );
    }
    res.push_str("</ul>\n</body>\n</html>\n");
    res
}

fn render_json(path: &str, entries: &[DirEntry]) -> String {
    #[derive(Serialize)]
    struct Listing<'a> {
        path: &'a str,
        entries: Vec<Item<'a>>,
    }

    #[derive(Serialize)]
    struct Item<'a> {
        name: &'a str,
        #[serde(rename = "type")]
        kind: &'static str,
        size: u64,
        href: String,
    }

    let listing = Listing {
        path,
        entries: entries.iter().map(|entry| {
            Item {
                name: &entry.name,
                kind: if entry.kind == EntryKind::Directory {
                    "directory"
                }
                else {
                    "file"
                },
                size: entry.size,
                href: href(path, entry),
            }
        }).collect(),
    };
    // Serializing plain structs to a string can’t fail.
    serde_json::to_string(&listing).unwrap_or_default()
}

/// Returns the percent-encoded link to an entry of the directory `path`.
fn href(path: &str, entry: &DirEntry) -> String {
    let mut res = utf8_percent_encode(path, HREF_SET).to_string();
    res.extend(utf8_percent_encode(&entry.name, HREF_SET));
    if entry.kind == EntryKind::Directory {
        res.push('/');
    }
    res
}

fn escape_html(s: &str) -> String {
    let mut res = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => res.push_str("&amp;"),
            '<' => res.push_str("&lt;"),
            '>' => res.push_str("&gt;"),
            '"' => res.push_str("&quot;"),
            '\'' => res.push_str("&#39;"),
            ch => res.push(ch),
        }
    }
    res
}


//============ Tests =========================================================
