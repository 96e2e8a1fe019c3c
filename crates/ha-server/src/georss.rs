//! GeoRSS and Atom feed parsing
//!
//! `feed-rs` reads the standard item fields. It drops extension elements,
//! so a second `quick-xml` pass over the same document collects the
//! location tags of each item:
//!
//! - `georss:point` (`"lat lon"`) and `georss:polygon` (`"lat lon lat lon ..."`)
//!   become the entry geometry
//! - `geo:lat` / `geo:long` (W3C basic geo) become the `geo_lat` / `geo_long`
//!   attributes

use feed_rs::model::Entry;
use feed_rs::parser;
use ha_geo_feed::{Coordinate, FeedEntry, Geometry};
use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::{debug, warn};

/// Location tags found inside one `<item>` / `<entry>`
#[derive(Debug, Default, Clone, PartialEq)]
struct GeoTags {
    point: Option<String>,
    polygon: Option<String>,
    lat: Option<String>,
    long: Option<String>,
}

#[derive(Debug, Clone, Copy)]
enum GeoTag {
    Point,
    Polygon,
    Lat,
    Long,
}

impl GeoTag {
    fn from_name(name: &[u8]) -> Option<Self> {
        match name {
            b"georss:point" => Some(GeoTag::Point),
            b"georss:polygon" => Some(GeoTag::Polygon),
            b"geo:lat" => Some(GeoTag::Lat),
            b"geo:long" => Some(GeoTag::Long),
            _ => None,
        }
    }
}

impl GeoTags {
    fn slot(&mut self, tag: GeoTag) -> &mut Option<String> {
        match tag {
            GeoTag::Point => &mut self.point,
            GeoTag::Polygon => &mut self.polygon,
            GeoTag::Lat => &mut self.lat,
            GeoTag::Long => &mut self.long,
        }
    }

    fn geometry(&self) -> Option<Geometry> {
        if let Some(point) = self.point.as_deref() {
            match coordinates(point).as_deref() {
                Some([coordinate]) => return Some(Geometry::Point(*coordinate)),
                _ => debug!(point, "Ignoring malformed georss:point"),
            }
        }
        if let Some(polygon) = self.polygon.as_deref() {
            match coordinates(polygon) {
                Some(ring) if !ring.is_empty() => return Some(Geometry::Polygon(ring)),
                _ => debug!(polygon, "Ignoring malformed georss:polygon"),
            }
        }
        None
    }
}

/// Whitespace separated `lat lon` pairs
fn coordinates(text: &str) -> Option<Vec<Coordinate>> {
    let values = text
        .split_whitespace()
        .map(|v| v.parse::<f64>().ok())
        .collect::<Option<Vec<_>>>()?;
    if values.len() % 2 != 0 {
        return None;
    }
    Some(
        values
            .chunks_exact(2)
            .map(|pair| Coordinate::new(pair[0], pair[1]))
            .collect(),
    )
}

/// Location tags of every item, in document order
fn scan_geo_tags(bytes: &[u8]) -> Result<Vec<GeoTags>, String> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);

    let mut items = Vec::new();
    let mut current: Option<GeoTags> = None;
    let mut capture: Option<GeoTag> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                if matches!(e.local_name().as_ref(), b"item" | b"entry") {
                    current = Some(GeoTags::default());
                } else if current.is_some() {
                    capture = GeoTag::from_name(e.name().as_ref());
                }
            }
            Ok(Event::Text(text)) => {
                if let (Some(tags), Some(tag)) = (current.as_mut(), capture) {
                    let text = text.unescape().map_err(|e| e.to_string())?;
                    tags.slot(tag).get_or_insert_with(String::new).push_str(&text);
                }
            }
            Ok(Event::End(e)) => {
                if matches!(e.local_name().as_ref(), b"item" | b"entry") {
                    if let Some(tags) = current.take() {
                        items.push(tags);
                    }
                }
                capture = None;
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(format!("XML parse error: {e}")),
            _ => {}
        }
        buf.clear();
    }

    Ok(items)
}

fn to_feed_entry(entry: Entry, tags: Option<&GeoTags>) -> FeedEntry {
    let mut feed_entry = FeedEntry::new();
    if !entry.id.trim().is_empty() {
        feed_entry = feed_entry.with_attribute("id", entry.id.trim());
    }
    if let Some(title) = entry.title {
        feed_entry = feed_entry.with_attribute("title", title.content);
    }
    if let Some(link) = entry.links.first() {
        feed_entry = feed_entry.with_attribute("link", link.href.clone());
    }
    if let Some(summary) = entry.summary {
        feed_entry = feed_entry.with_attribute("summary", summary.content);
    }
    if let Some(category) = entry.categories.first() {
        feed_entry = feed_entry.with_attribute("category", category.term.clone());
    }
    if let Some(published) = entry.published.or(entry.updated) {
        feed_entry = feed_entry.with_attribute("published", published.to_rfc3339());
    }

    if let Some(tags) = tags {
        if let Some(geometry) = tags.geometry() {
            feed_entry = feed_entry.with_geometry(&geometry);
        }
        if let Some(lat) = &tags.lat {
            feed_entry = feed_entry.with_attribute("geo_lat", lat.trim());
        }
        if let Some(long) = &tags.long {
            feed_entry = feed_entry.with_attribute("geo_long", long.trim());
        }
    }
    feed_entry
}

/// Entries of an RSS or Atom document with their GeoRSS locations
pub fn parse_georss(bytes: &[u8]) -> Result<Vec<FeedEntry>, String> {
    let feed = parser::parse(bytes).map_err(|e| e.to_string())?;
    let tags = scan_geo_tags(bytes)?;

    let tags = if tags.len() == feed.entries.len() {
        tags
    } else {
        warn!(
            entries = feed.entries.len(),
            tagged = tags.len(),
            "Feed items do not line up with parsed entries, ignoring locations"
        );
        Vec::new()
    };

    Ok(feed
        .entries
        .into_iter()
        .enumerate()
        .map(|(i, entry)| to_feed_entry(entry, tags.get(i)))
        .collect())
}
