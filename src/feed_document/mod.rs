//! Feed document rendering (§4.6 Stage 5): turns the stored `Feed` +
//! `Episode` rows into the iTunes-compatible podcast XML and the combined
//! `podsync.opml` subscription list. The RSS/OPML wire format itself is
//! out of scope for this spec (§1) — only "render feed document from
//! domain object" is — so this module stays a thin serde/`quick_xml` layer
//! over the domain types, in the same style as the teacher's OPML export
//! (`quick_xml::se::to_string` over a private serialization struct).

use chrono::Utc;
use serde::Serialize;

use crate::models::{Episode, EpisodeStatus, Feed};

const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";

#[derive(Debug, Serialize)]
#[serde(rename = "rss")]
struct RssRoot {
    #[serde(rename = "@version")]
    version: String,
    #[serde(rename = "@xmlns:itunes")]
    xmlns_itunes: String,
    channel: RssChannel,
}

#[derive(Debug, Serialize)]
struct RssChannel {
    title: String,
    link: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(rename = "lastBuildDate")]
    last_build_date: String,
    #[serde(rename = "itunes:author", skip_serializing_if = "Option::is_none")]
    itunes_author: Option<String>,
    #[serde(rename = "itunes:explicit")]
    itunes_explicit: String,
    #[serde(rename = "itunes:image", skip_serializing_if = "Option::is_none")]
    itunes_image: Option<ItunesImage>,
    #[serde(rename = "itunes:category", skip_serializing_if = "Option::is_none")]
    itunes_category: Option<ItunesCategory>,
    #[serde(rename = "item", default)]
    items: Vec<RssItem>,
}

#[derive(Debug, Serialize)]
struct ItunesImage {
    #[serde(rename = "@href")]
    href: String,
}

#[derive(Debug, Serialize)]
struct ItunesCategory {
    #[serde(rename = "@text")]
    text: String,
}

#[derive(Debug, Serialize)]
struct RssItem {
    title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    guid: String,
    #[serde(rename = "pubDate")]
    pub_date: String,
    enclosure: RssEnclosure,
    #[serde(rename = "itunes:duration")]
    itunes_duration: String,
}

#[derive(Debug, Serialize)]
struct RssEnclosure {
    #[serde(rename = "@url")]
    url: String,
    #[serde(rename = "@length")]
    length: String,
    #[serde(rename = "@type")]
    mime_type: String,
}

/// Renders the iTunes-compatible RSS document for `feed`. Only
/// `status=downloaded` episodes are emitted as playable items — a
/// `blocked`/`cleaned`/`queued` episode has no committed artifact (or had
/// it removed) so it has nothing an enclosure could point at (§3, §8
/// scenario 4: a blocked episode is "not present in feed XML").
pub fn render_rss(feed: &Feed, episodes: &[Episode], base_url: &str) -> String {
    let mut downloaded: Vec<&Episode> = episodes
        .iter()
        .filter(|e| e.status == EpisodeStatus::Downloaded)
        .collect();
    downloaded.sort_by_key(|e| std::cmp::Reverse(e.published));

    let extension = feed.media_extension();
    let mime_type = feed.media_mime_type();
    let title = feed
        .custom
        .title_override
        .clone()
        .unwrap_or_else(|| feed.title.clone());
    let description = feed
        .custom
        .description_override
        .clone()
        .or_else(|| feed.description.clone());

    let items = downloaded
        .into_iter()
        .map(|episode| RssItem {
            title: episode.title.clone(),
            description: episode.description.clone(),
            guid: episode.id.clone(),
            pub_date: episode.published.to_rfc2822(),
            enclosure: RssEnclosure {
                url: format!("{base_url}/{}", episode.artifact_path(&extension)),
                length: episode.size.to_string(),
                mime_type: mime_type.to_string(),
            },
            itunes_duration: episode.duration.to_string(),
        })
        .collect();

    let root = RssRoot {
        version: "2.0".to_string(),
        xmlns_itunes: "http://www.itunes.com/dtds/podcast-1.0.dtd".to_string(),
        channel: RssChannel {
            title,
            link: format!("{base_url}/{}", feed.id),
            description,
            last_build_date: Utc::now().to_rfc2822(),
            itunes_author: feed.author.clone(),
            itunes_explicit: if feed.custom.explicit { "yes" } else { "no" }.to_string(),
            itunes_image: feed.cover_art.clone().map(|href| ItunesImage { href }),
            itunes_category: feed.custom.category.clone().map(|text| ItunesCategory { text }),
            items,
        },
    };

    let mut xml = String::from(XML_DECLARATION);
    xml.push_str(&quick_xml::se::to_string(&root).expect("feed document struct is always serializable"));
    xml
}

#[derive(Debug, Serialize)]
#[serde(rename = "opml")]
struct OpmlRoot {
    #[serde(rename = "@version")]
    version: String,
    head: OpmlHead,
    body: OpmlBody,
}

#[derive(Debug, Serialize)]
struct OpmlHead {
    title: String,
    #[serde(rename = "dateCreated")]
    date_created: String,
}

#[derive(Debug, Serialize)]
struct OpmlBody {
    #[serde(rename = "outline", default)]
    outlines: Vec<OpmlOutline>,
}

#[derive(Debug, Serialize)]
struct OpmlOutline {
    #[serde(rename = "@text")]
    text: String,
    #[serde(rename = "@title")]
    title: String,
    #[serde(rename = "@type")]
    outline_type: String,
    #[serde(rename = "@xmlUrl")]
    xml_url: String,
}

/// Renders `podsync.opml` from every feed flagged `opml_visible` (§4.6
/// Stage 5). Callers are expected to have already filtered to the visible
/// set; this function renders exactly what it is given.
pub fn render_opml(feeds: &[Feed], base_url: &str) -> String {
    let outlines = feeds
        .iter()
        .map(|feed| OpmlOutline {
            text: feed.title.clone(),
            title: feed.title.clone(),
            outline_type: "rss".to_string(),
            xml_url: format!("{base_url}/{}.xml", feed.id),
        })
        .collect();

    let root = OpmlRoot {
        version: "2.0".to_string(),
        head: OpmlHead {
            title: "Podsync Subscriptions".to_string(),
            date_created: Utc::now().to_rfc2822(),
        },
        body: OpmlBody { outlines },
    };

    let mut xml = String::from(XML_DECLARATION);
    xml.push_str(&quick_xml::se::to_string(&root).expect("opml struct is always serializable"));
    xml
}
