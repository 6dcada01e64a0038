use std::ops::Range;

use roxmltree::{Document, Node};
use url::Url;

use super::{
    template::{has_identifier, Template},
    timeline::{
        numbered_positions, parse_duration, period_durations, timeline_positions,
        SegmentPosition, TimelineSegment,
    },
    url::merge_baseurls,
};
use crate::{
    error::{MirrorError, MirrorResult},
    manifest::{
        is_mirrorable, ManifestDocument, ManifestFormat, ManifestKind, ResourceReference,
        ResourceRole, RewriteTarget, TemplateExpansion, UriLocation,
    },
};

/// Parse a MPD document and extract every resource it refers to.
///
/// Only a malformed document or a root element other than `MPD` is an error.
/// Elements that can not be understood are skipped with a warning.
pub fn parse(xml: &str, manifest_url: &Url) -> MirrorResult<ManifestDocument> {
    let document = Document::parse(xml)?;
    let mpd = document.root_element();
    if mpd.tag_name().name() != "MPD" {
        return Err(MirrorError::MpdParse(format!(
            "unexpected root element <{}>",
            mpd.tag_name().name()
        )));
    }
    if mpd.attribute("type") == Some("dynamic") {
        log::warn!("{manifest_url} is a dynamic MPD, only the segments listed now are mirrored");
    }

    let mut parser = MpdParser {
        xml,
        output: ManifestDocument::new(
            manifest_url.clone(),
            ManifestFormat::Dash,
            ManifestKind::Dash,
            xml,
        ),
    };

    let base_url = match parser.base_url(mpd, manifest_url) {
        Ok(Some(base)) => {
            parser.push_directory(&base, manifest_url);
            base.url
        }
        Ok(None) => manifest_url.clone(),
        Err(e) => {
            log::warn!("Ignoring invalid MPD BaseURL: {e}");
            manifest_url.clone()
        }
    };

    let presentation_duration = mpd
        .attribute("mediaPresentationDuration")
        .and_then(parse_duration);
    let periods: Vec<Node> = children(mpd, "Period").collect();
    let declared: Vec<_> = periods
        .iter()
        .map(|period| {
            (
                period.attribute("start").and_then(parse_duration),
                period.attribute("duration").and_then(parse_duration),
            )
        })
        .collect();
    let durations = period_durations(&declared, presentation_duration);

    for (period, duration) in periods.into_iter().zip(durations) {
        parser.period(period, &base_url, duration);
    }

    Ok(parser.output)
}

struct MpdParser<'x> {
    xml: &'x str,
    output: ManifestDocument,
}

/// A resolved `BaseURL` element.
struct BaseUrl {
    url: Url,
    /// Trimmed text of the element.
    value: String,
    range: Range<usize>,
}

impl BaseUrl {
    fn is_file(&self) -> bool {
        !self.value.ends_with('/')
    }
}

/// An attribute value with its position in the document.
#[derive(Debug, Clone)]
struct Located<'a> {
    value: &'a str,
    range: Range<usize>,
}

/// `SegmentTemplate` attributes, inherited from Period to AdaptationSet to Representation.
#[derive(Debug, Clone, Default)]
struct TemplateAttributes<'a, 'input> {
    media: Option<Located<'a>>,
    initialization: Option<Located<'a>>,
    index: Option<Located<'a>>,
    timescale: Option<&'a str>,
    duration: Option<&'a str>,
    start_number: Option<&'a str>,
    end_number: Option<&'a str>,
    presentation_time_offset: Option<&'a str>,
    timeline: Option<Node<'a, 'input>>,
}

impl<'a, 'input> TemplateAttributes<'a, 'input> {
    fn inherit(&self, node: Node<'a, 'input>) -> Self {
        let Some(template) = child(node, "SegmentTemplate") else {
            return self.clone();
        };
        Self {
            media: located(template, "media").or_else(|| self.media.clone()),
            initialization: located(template, "initialization")
                .or_else(|| self.initialization.clone()),
            index: located(template, "index").or_else(|| self.index.clone()),
            timescale: template.attribute("timescale").or(self.timescale),
            duration: template.attribute("duration").or(self.duration),
            start_number: template.attribute("startNumber").or(self.start_number),
            end_number: template.attribute("endNumber").or(self.end_number),
            presentation_time_offset: template
                .attribute("presentationTimeOffset")
                .or(self.presentation_time_offset),
            timeline: child(template, "SegmentTimeline").or(self.timeline),
        }
    }

    fn is_empty(&self) -> bool {
        self.media.is_none() && self.initialization.is_none() && self.index.is_none()
    }
}

/// Addressing information a representation inherits from its ancestors.
#[derive(Debug, Clone, Default)]
struct Inherited<'a, 'input> {
    template: TemplateAttributes<'a, 'input>,
    segment_list: Option<Node<'a, 'input>>,
    segment_base: Option<Node<'a, 'input>>,
}

impl<'a, 'input> Inherited<'a, 'input> {
    fn merge(&self, node: Node<'a, 'input>) -> Self {
        Self {
            template: self.template.inherit(node),
            segment_list: child(node, "SegmentList").or(self.segment_list),
            segment_base: child(node, "SegmentBase").or(self.segment_base),
        }
    }
}

/// References and locations of one representation, committed only when the
/// whole representation is understood.
#[derive(Default)]
struct Collected {
    references: Vec<ResourceReference>,
    locations: Vec<UriLocation>,
}

impl Collected {
    fn reference(&mut self, role: ResourceRole, raw_uri: &str, url: Url) {
        if is_mirrorable(&url) {
            self.references.push(ResourceReference {
                role,
                raw_uri: raw_uri.to_string(),
                url,
            });
        }
    }

    fn location(&mut self, range: Range<usize>, base: &Url, target: RewriteTarget) {
        self.locations.push(UriLocation {
            range,
            base: base.clone(),
            target,
        });
    }
}

impl MpdParser<'_> {
    fn period(&mut self, period: Node, parent: &Url, duration: Option<f64>) {
        let Some(base_url) = self.resolve_level(period, parent) else {
            return;
        };
        let inherited = Inherited::default().merge(period);

        for adaptation_set in children(period, "AdaptationSet") {
            self.adaptation_set(adaptation_set, &base_url, &inherited, duration);
        }
    }

    fn adaptation_set<'a, 'input>(
        &mut self,
        adaptation_set: Node<'a, 'input>,
        parent: &Url,
        inherited: &Inherited<'a, 'input>,
        period_duration: Option<f64>,
    ) {
        let Some(base_url) = self.resolve_level(adaptation_set, parent) else {
            return;
        };
        let inherited = inherited.merge(adaptation_set);
        let is_text = is_text_node(adaptation_set);

        for representation in children(adaptation_set, "Representation") {
            let context = RepresentationContext {
                parent: &base_url,
                inherited: inherited.merge(representation),
                period_duration,
                media_role: if is_text || is_text_node(representation) {
                    ResourceRole::TextTrack
                } else {
                    ResourceRole::MediaSegment
                },
            };
            match self.representation(representation, &context) {
                Ok(collected) => {
                    self.output.references.extend(collected.references);
                    self.output.locations.extend(collected.locations);
                }
                Err(reason) => {
                    log::warn!(
                        "Skipping representation {}: {reason}",
                        representation.attribute("id").unwrap_or("<no id>")
                    );
                }
            }
        }
    }

    fn representation(
        &self,
        representation: Node,
        context: &RepresentationContext,
    ) -> Result<Collected, String> {
        let mut collected = Collected::default();
        let own_base = self
            .base_url(representation, context.parent)
            .map_err(|e| format!("invalid BaseURL: {e}"))?;
        let base_url = own_base
            .as_ref()
            .map(|b| b.url.clone())
            .unwrap_or_else(|| context.parent.clone());

        let template = &context.inherited.template;
        if !template.is_empty() {
            if let Some(own_base) = &own_base {
                collected.location(
                    own_base.range.clone(),
                    context.parent,
                    RewriteTarget::Directory {
                        url: own_base.url.clone(),
                    },
                );
            }
            self.segment_template(representation, context, &base_url, &mut collected)?;
            return Ok(collected);
        }

        let mut base_is_media = true;
        if let Some(segment_list) = context.inherited.segment_list {
            base_is_media = false;
            self.segment_header(segment_list, &base_url, &mut collected)?;
            for segment_url in children(segment_list, "SegmentURL") {
                match located(segment_url, "media") {
                    Some(media) => self.located_resource(
                        &media,
                        &base_url,
                        context.media_role,
                        &mut collected,
                    )?,
                    // byte ranges of the base url itself
                    None => base_is_media = true,
                }
                if let Some(index) = located(segment_url, "index") {
                    self.located_resource(
                        &index,
                        &base_url,
                        ResourceRole::IndexSegment,
                        &mut collected,
                    )?;
                }
            }
        } else if let Some(segment_base) = context.inherited.segment_base {
            self.segment_header(segment_base, &base_url, &mut collected)?;
        }

        match &own_base {
            Some(own_base) if base_is_media && own_base.is_file() => {
                collected.location(
                    own_base.range.clone(),
                    context.parent,
                    RewriteTarget::Resource {
                        url: own_base.url.clone(),
                    },
                );
                collected.reference(context.media_role, &own_base.value, own_base.url.clone());
                return Ok(collected);
            }
            Some(own_base) => collected.location(
                own_base.range.clone(),
                context.parent,
                RewriteTarget::Directory {
                    url: own_base.url.clone(),
                },
            ),
            None => {}
        }

        if base_is_media && collected.references.is_empty() {
            return Err("no segment information".to_string());
        }
        Ok(collected)
    }

    fn segment_template(
        &self,
        representation: Node,
        context: &RepresentationContext,
        base_url: &Url,
        collected: &mut Collected,
    ) -> Result<(), String> {
        let template = &context.inherited.template;

        let mut fixed: Vec<(&'static str, String)> = Vec::with_capacity(2);
        let id = representation.attribute("id");
        if let Some(id) = id {
            fixed.push((Template::REPRESENTATION_ID, id.to_string()));
        }
        if let Some(bandwidth) = representation.attribute("bandwidth") {
            fixed.push((Template::BANDWIDTH, bandwidth.to_string()));
        }

        let needs_id = [&template.media, &template.initialization, &template.index]
            .into_iter()
            .flatten()
            .any(|t| has_identifier(t.value, Template::REPRESENTATION_ID));
        if needs_id && id.is_none() {
            return Err("$RepresentationID$ is used but @id is missing".to_string());
        }

        for (attribute, role) in [
            (&template.initialization, ResourceRole::InitSegment),
            (&template.index, ResourceRole::IndexSegment),
        ] {
            let Some(attribute) = attribute else {
                continue;
            };
            let resolved = fixed
                .iter()
                .cloned()
                .collect::<Template>()
                .resolve(attribute.value);
            let url = merge_baseurls(base_url, &resolved)
                .map_err(|e| format!("invalid {role} url {resolved}: {e}"))?;
            collected.location(
                attribute.range.clone(),
                base_url,
                RewriteTarget::Template {
                    template: attribute.value.to_string(),
                    expansions: vec![TemplateExpansion {
                        values: fixed.clone(),
                        url: url.clone(),
                    }],
                },
            );
            collected.reference(role, &resolved, url);
        }

        let Some(media) = &template.media else {
            return Ok(());
        };

        let positions = self.segment_positions(template, context.period_duration)?;
        let mut expansions = Vec::with_capacity(positions.len());
        for position in positions {
            let mut values = fixed.clone();
            values.push((Template::NUMBER, position.number.to_string()));
            values.push((Template::TIME, position.time.to_string()));
            let resolved = values
                .iter()
                .cloned()
                .collect::<Template>()
                .resolve(media.value);
            let url = merge_baseurls(base_url, &resolved)
                .map_err(|e| format!("invalid segment url {resolved}: {e}"))?;
            collected.reference(context.media_role, &resolved, url.clone());
            expansions.push(TemplateExpansion { values, url });
        }
        collected.location(
            media.range.clone(),
            base_url,
            RewriteTarget::Template {
                template: media.value.to_string(),
                expansions,
            },
        );
        Ok(())
    }

    /// `Initialization` and `RepresentationIndex` of a `SegmentList` or `SegmentBase`.
    fn segment_header(
        &self,
        node: Node,
        base_url: &Url,
        collected: &mut Collected,
    ) -> Result<(), String> {
        for (name, role) in [
            ("Initialization", ResourceRole::InitSegment),
            ("RepresentationIndex", ResourceRole::IndexSegment),
        ] {
            if let Some(source) = child(node, name).and_then(|n| located(n, "sourceURL")) {
                self.located_resource(&source, base_url, role, collected)?;
            }
        }
        Ok(())
    }

    fn segment_positions(
        &self,
        template: &TemplateAttributes,
        period_duration: Option<f64>,
    ) -> Result<Vec<SegmentPosition>, String> {
        let start_number = parse_number(template.start_number, "startNumber")?.unwrap_or(1);
        let timescale = parse_number(template.timescale, "timescale")?
            .filter(|t| *t > 0)
            .unwrap_or(1);
        let presentation_time_offset =
            parse_number(template.presentation_time_offset, "presentationTimeOffset")?
                .unwrap_or(0);

        if let Some(timeline) = template.timeline {
            let mut segments = Vec::new();
            for s in children(timeline, "S") {
                let duration = parse_number(s.attribute("d"), "d")?
                    .ok_or("S element without @d")?;
                let repeat_count = match s.attribute("r") {
                    Some(r) => r.parse::<i64>().map_err(|_| format!("invalid S@r {r:?}"))?,
                    None => 0,
                };
                segments.push(TimelineSegment {
                    time: parse_number(s.attribute("t"), "t")?,
                    duration,
                    repeat_count,
                });
            }
            let end_time = period_duration.map(|duration| {
                presentation_time_offset + (duration * timescale as f64).round() as u64
            });
            return timeline_positions(&segments, start_number, end_time);
        }

        let needs_count = template
            .media
            .as_ref()
            .is_some_and(|m| {
                has_identifier(m.value, Template::NUMBER) || has_identifier(m.value, Template::TIME)
            });
        if !needs_count {
            // a single segment, the template is a plain url
            return Ok(vec![SegmentPosition {
                number: start_number,
                time: presentation_time_offset,
            }]);
        }

        numbered_positions(
            start_number,
            parse_number(template.end_number, "endNumber")?,
            parse_number(template.duration, "duration")?,
            timescale,
            presentation_time_offset,
            period_duration,
        )
    }

    /// Reference a `sourceURL`/`media` attribute and record it as a location.
    fn located_resource(
        &self,
        attribute: &Located,
        base_url: &Url,
        role: ResourceRole,
        collected: &mut Collected,
    ) -> Result<(), String> {
        let url = merge_baseurls(base_url, attribute.value)
            .map_err(|e| format!("invalid url {}: {e}", attribute.value))?;
        if is_mirrorable(&url) {
            collected.location(
                attribute.range.clone(),
                base_url,
                RewriteTarget::Resource { url: url.clone() },
            );
        }
        collected.reference(role, attribute.value, url);
        Ok(())
    }

    /// Resolve the `BaseURL` of a Period or AdaptationSet and record its location.
    ///
    /// Returns `None` when the element should be skipped.
    fn resolve_level(&mut self, node: Node, parent: &Url) -> Option<Url> {
        match self.base_url(node, parent) {
            Ok(Some(base)) => {
                self.push_directory(&base, parent);
                Some(base.url)
            }
            Ok(None) => Some(parent.clone()),
            Err(e) => {
                log::warn!("Skipping {} with invalid BaseURL: {e}", node.tag_name().name());
                None
            }
        }
    }

    fn push_directory(&mut self, base: &BaseUrl, parent: &Url) {
        if is_mirrorable(&base.url) {
            self.output.locations.push(UriLocation {
                range: base.range.clone(),
                base: parent.clone(),
                target: RewriteTarget::Directory {
                    url: base.url.clone(),
                },
            });
        }
    }

    /// The first `BaseURL` child of `node`, resolved against `parent`.
    fn base_url(&self, node: Node, parent: &Url) -> MirrorResult<Option<BaseUrl>> {
        let Some(element) = child(node, "BaseURL") else {
            return Ok(None);
        };
        let Some(text) = element.first_child().filter(|c| c.is_text()) else {
            return Ok(None);
        };
        let value = element.text().unwrap_or_default().trim();
        if value.is_empty() {
            return Ok(None);
        }

        let url = merge_baseurls(parent, value)?;
        Ok(Some(BaseUrl {
            url,
            value: value.to_string(),
            range: trimmed_range(self.xml, text.range()),
        }))
    }
}

struct RepresentationContext<'p, 'a, 'input> {
    parent: &'p Url,
    inherited: Inherited<'a, 'input>,
    period_duration: Option<f64>,
    media_role: ResourceRole,
}

fn children<'a, 'input>(
    node: Node<'a, 'input>,
    name: &'static str,
) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children()
        .filter(move |c| c.is_element() && c.tag_name().name() == name)
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &'static str) -> Option<Node<'a, 'input>> {
    children(node, name).next()
}

fn located<'a>(node: Node<'a, '_>, name: &str) -> Option<Located<'a>> {
    node.attributes()
        .find(|a| a.name() == name)
        .map(|a| Located {
            value: a.value(),
            range: a.range_value(),
        })
}

fn trimmed_range(xml: &str, range: Range<usize>) -> Range<usize> {
    let raw = &xml[range.clone()];
    let start = range.start + (raw.len() - raw.trim_start().len());
    start..start + raw.trim().len()
}

fn parse_number(value: Option<&str>, name: &str) -> Result<Option<u64>, String> {
    value
        .map(|v| {
            v.trim()
                .parse::<u64>()
                .map_err(|_| format!("invalid @{name} {v:?}"))
        })
        .transpose()
}

fn is_text_node(node: Node) -> bool {
    if node.attribute("contentType") == Some("text") {
        return true;
    }
    if let Some(mime_type) = node.attribute("mimeType") {
        if mime_type.starts_with("text/") || mime_type == "application/ttml+xml" {
            return true;
        }
    }
    node.attribute("codecs").is_some_and(|codecs| {
        codecs
            .split(',')
            .any(|c| matches!(c.trim().split('.').next(), Some("wvtt" | "stpp")))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_str(xml: &str) -> ManifestDocument {
        let url = Url::parse("https://cdn.example.com/vod/manifest.mpd").unwrap();
        parse(xml, &url).unwrap()
    }

    fn urls(doc: &ManifestDocument, role: ResourceRole) -> Vec<String> {
        doc.references_with_role(role)
            .map(|r| r.url.to_string())
            .collect()
    }

    #[test]
    fn test_template_with_end_number() {
        let doc = parse_str(
            r#"<MPD xmlns="urn:mpeg:dash:schema:mpd:2011" type="static">
  <Period>
    <AdaptationSet mimeType="video/mp4">
      <SegmentTemplate media="chunk-$Number$.m4s" initialization="init.mp4" startNumber="1" endNumber="5"/>
      <Representation id="v0" bandwidth="800000"/>
    </AdaptationSet>
  </Period>
</MPD>"#,
        );
        assert_eq!(doc.kind, ManifestKind::Dash);
        let media: Vec<&str> = doc
            .references_with_role(ResourceRole::MediaSegment)
            .map(|r| r.raw_uri.as_str())
            .collect();
        assert_eq!(
            media,
            ["chunk-1.m4s", "chunk-2.m4s", "chunk-3.m4s", "chunk-4.m4s", "chunk-5.m4s"]
        );
        assert_eq!(
            urls(&doc, ResourceRole::InitSegment),
            ["https://cdn.example.com/vod/init.mp4"]
        );
    }

    #[test]
    fn test_template_with_duration() {
        let doc = parse_str(
            r#"<MPD mediaPresentationDuration="PT10S">
  <Period>
    <AdaptationSet contentType="audio">
      <Representation id="a0" bandwidth="128000">
        <SegmentTemplate media="$RepresentationID$/$Number%03d$.m4s" duration="4" timescale="2"/>
      </Representation>
    </AdaptationSet>
  </Period>
</MPD>"#,
        );
        assert_eq!(
            urls(&doc, ResourceRole::MediaSegment),
            [
                "https://cdn.example.com/vod/a0/001.m4s",
                "https://cdn.example.com/vod/a0/002.m4s",
                "https://cdn.example.com/vod/a0/003.m4s",
                "https://cdn.example.com/vod/a0/004.m4s",
                "https://cdn.example.com/vod/a0/005.m4s",
            ]
        );
    }

    #[test]
    fn test_base_url_chain() {
        let doc = parse_str(
            r#"<MPD>
  <BaseURL>https://cdn.example.com/a/</BaseURL>
  <Period duration="PT2S">
    <AdaptationSet>
      <Representation id="r">
        <BaseURL>b/</BaseURL>
        <SegmentList>
          <SegmentURL media="seg.m4s"/>
        </SegmentList>
      </Representation>
    </AdaptationSet>
  </Period>
</MPD>"#,
        );
        assert_eq!(
            urls(&doc, ResourceRole::MediaSegment),
            ["https://cdn.example.com/a/b/seg.m4s"]
        );

        let directories: Vec<(&str, String)> = doc
            .locations
            .iter()
            .filter_map(|l| match &l.target {
                RewriteTarget::Directory { url } => Some((&doc.text[l.range.clone()], url.to_string())),
                _ => None,
            })
            .collect();
        assert_eq!(
            directories,
            [
                ("https://cdn.example.com/a/", "https://cdn.example.com/a/".to_string()),
                ("b/", "https://cdn.example.com/a/b/".to_string()),
            ]
        );
    }

    #[test]
    fn test_segment_timeline_inheritance() {
        let doc = parse_str(
            r#"<MPD mediaPresentationDuration="PT8S">
  <Period>
    <SegmentTemplate timescale="1000" startNumber="10">
      <SegmentTimeline>
        <S t="0" d="2000" r="-1"/>
      </SegmentTimeline>
    </SegmentTemplate>
    <AdaptationSet>
      <SegmentTemplate media="$RepresentationID$-$Time$.m4s"/>
      <Representation id="hi"/>
      <Representation id="lo">
        <SegmentTemplate media="lo/$Number$.m4s"/>
      </Representation>
    </AdaptationSet>
  </Period>
</MPD>"#,
        );
        assert_eq!(
            urls(&doc, ResourceRole::MediaSegment),
            [
                "https://cdn.example.com/vod/hi-0.m4s",
                "https://cdn.example.com/vod/hi-2000.m4s",
                "https://cdn.example.com/vod/hi-4000.m4s",
                "https://cdn.example.com/vod/hi-6000.m4s",
                "https://cdn.example.com/vod/lo/10.m4s",
                "https://cdn.example.com/vod/lo/11.m4s",
                "https://cdn.example.com/vod/lo/12.m4s",
                "https://cdn.example.com/vod/lo/13.m4s",
            ]
        );
        // the shared template is located once per representation using it
        let templates = doc
            .locations
            .iter()
            .filter(|l| matches!(l.target, RewriteTarget::Template { .. }))
            .count();
        assert_eq!(templates, 2);
    }

    #[test]
    fn test_text_tracks_and_single_files() {
        let doc = parse_str(
            r#"<MPD>
  <Period duration="PT30S">
    <AdaptationSet contentType="text" mimeType="text/vtt" lang="en">
      <Representation id="sub-en">
        <BaseURL>subs/en.vtt</BaseURL>
      </Representation>
    </AdaptationSet>
    <AdaptationSet mimeType="video/mp4">
      <Representation id="v" codecs="avc1.64001f">
        <BaseURL>video.mp4</BaseURL>
        <SegmentBase indexRange="800-1200">
          <Initialization range="0-799"/>
        </SegmentBase>
      </Representation>
    </AdaptationSet>
    <AdaptationSet mimeType="application/mp4" codecs="stpp">
      <Representation id="ttml">
        <SegmentTemplate media="ttml/$Number$.mp4" endNumber="2"/>
      </Representation>
    </AdaptationSet>
  </Period>
</MPD>"#,
        );
        assert_eq!(
            urls(&doc, ResourceRole::TextTrack),
            [
                "https://cdn.example.com/vod/subs/en.vtt",
                "https://cdn.example.com/vod/ttml/1.mp4",
                "https://cdn.example.com/vod/ttml/2.mp4",
            ]
        );
        assert_eq!(
            urls(&doc, ResourceRole::MediaSegment),
            ["https://cdn.example.com/vod/video.mp4"]
        );
        let resources = doc
            .locations
            .iter()
            .filter(|l| matches!(l.target, RewriteTarget::Resource { .. }))
            .count();
        assert_eq!(resources, 2);
    }

    #[test]
    fn test_index_segments() {
        let doc = parse_str(
            r#"<MPD>
  <Period duration="PT4S">
    <AdaptationSet mimeType="video/mp4">
      <SegmentTemplate media="$RepresentationID$/$Number$.m4s" index="$RepresentationID$/index.sidx" duration="2"/>
      <Representation id="v0"/>
    </AdaptationSet>
    <AdaptationSet mimeType="audio/mp4">
      <Representation id="a0">
        <BaseURL>audio.mp4</BaseURL>
        <SegmentBase indexRange="0-99">
          <RepresentationIndex sourceURL="audio.sidx"/>
        </SegmentBase>
      </Representation>
      <Representation id="a1">
        <SegmentList duration="2">
          <RepresentationIndex sourceURL="a1/full.sidx"/>
          <SegmentURL media="a1/1.m4s" index="a1/1.sidx"/>
        </SegmentList>
      </Representation>
    </AdaptationSet>
  </Period>
</MPD>"#,
        );
        assert_eq!(
            urls(&doc, ResourceRole::IndexSegment),
            [
                "https://cdn.example.com/vod/v0/index.sidx",
                "https://cdn.example.com/vod/audio.sidx",
                "https://cdn.example.com/vod/a1/full.sidx",
                "https://cdn.example.com/vod/a1/1.sidx",
            ]
        );
        assert_eq!(
            urls(&doc, ResourceRole::MediaSegment),
            [
                "https://cdn.example.com/vod/v0/1.m4s",
                "https://cdn.example.com/vod/v0/2.m4s",
                "https://cdn.example.com/vod/audio.mp4",
                "https://cdn.example.com/vod/a1/1.m4s",
            ]
        );

        let index_template = doc
            .locations
            .iter()
            .find_map(|l| match &l.target {
                RewriteTarget::Template {
                    template,
                    expansions,
                } if template.ends_with(".sidx") => Some(expansions),
                _ => None,
            })
            .unwrap();
        assert_eq!(index_template.len(), 1);
        assert_eq!(
            index_template[0].values,
            [(Template::REPRESENTATION_ID, "v0".to_string())]
        );
    }

    #[test]
    fn test_recoverable_skips() {
        let doc = parse_str(
            r#"<MPD>
  <Period>
    <AdaptationSet>
      <SegmentTemplate media="$RepresentationID$/$Number$.m4s"/>
      <Representation bandwidth="1"/>
      <Representation id="no-count"/>
    </AdaptationSet>
    <AdaptationSet>
      <Representation id="bad-s">
        <SegmentTemplate media="$Time$.m4s">
          <SegmentTimeline><S t="0"/></SegmentTimeline>
        </SegmentTemplate>
      </Representation>
      <Representation id="bad-start">
        <SegmentTemplate media="bad-$Number$.m4s" startNumber="x" endNumber="2"/>
      </Representation>
      <Representation id="fine">
        <SegmentTemplate media="fine-$Number$.m4s" startNumber="0" endNumber="1"/>
      </Representation>
    </AdaptationSet>
  </Period>
</MPD>"#,
        );
        assert_eq!(
            urls(&doc, ResourceRole::MediaSegment),
            [
                "https://cdn.example.com/vod/fine-0.m4s",
                "https://cdn.example.com/vod/fine-1.m4s",
            ]
        );
    }

    #[test]
    fn test_fatal_errors() {
        let url = Url::parse("https://cdn.example.com/manifest.mpd").unwrap();
        assert!(matches!(
            parse("<html><body/></html>", &url),
            Err(MirrorError::MpdParse(_))
        ));
        assert!(matches!(
            parse("<MPD><Period>", &url),
            Err(MirrorError::XmlError(_))
        ));
    }

    #[test]
    fn test_multi_period_durations() {
        let doc = parse_str(
            r#"<MPD mediaPresentationDuration="PT6S">
  <Period id="p0" start="PT0S">
    <AdaptationSet>
      <Representation id="a"><SegmentTemplate media="p0-$Number$.m4s" duration="2"/></Representation>
    </AdaptationSet>
  </Period>
  <Period id="p1" start="PT4S">
    <AdaptationSet>
      <Representation id="a"><SegmentTemplate media="p1-$Number$.m4s" duration="2"/></Representation>
    </AdaptationSet>
  </Period>
</MPD>"#,
        );
        let media: Vec<&str> = doc
            .references_with_role(ResourceRole::MediaSegment)
            .map(|r| r.raw_uri.as_str())
            .collect();
        assert_eq!(media, ["p0-1.m4s", "p0-2.m4s", "p1-1.m4s"]);
    }
}
