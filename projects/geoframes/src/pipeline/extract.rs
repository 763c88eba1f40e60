// Metadata extractor: embedded GPS documents -> sorted samples + container attributes

use crate::error::{PipelineError, SampleParseError};
use crate::pipeline::events::{PipelineEvent, PipelineObserver};
use crate::pipeline::types::{ContainerAttributes, GpsSample};
use crate::tools::{retry, MetadataTool, RetryPolicy, TagMap};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// Prefix shared by every per-sample document key.
const DOC_PREFIX: &str = "Doc";
const LATITUDE_SUFFIX: &str = ":GPSLatitude";

/// Which hemisphere letters make a sexagesimal coordinate negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Hemisphere {
    /// South and West are negative.
    Standard,
    /// North and East are negative, as in sequences produced by older tooling.
    #[default]
    Inverted,
}

impl Hemisphere {
    fn sign(&self, direction: &str) -> f64 {
        let negative = match self {
            Self::Standard => matches!(direction, "S" | "W"),
            Self::Inverted => matches!(direction, "N" | "E"),
        };
        if negative {
            -1.0
        } else {
            1.0
        }
    }
}

#[derive(Debug, Clone)]
pub struct Extraction {
    /// Strictly ascending by `sample_offset`.
    pub samples: Vec<GpsSample>,
    pub attributes: ContainerAttributes,
}

/// Reads the video's embedded metadata and normalizes it.
pub async fn extract_metadata<T: MetadataTool>(
    tool: &T,
    video: &Path,
    retry_policy: &RetryPolicy,
    hemisphere: Hemisphere,
    observer: &dyn PipelineObserver,
) -> Result<Extraction, PipelineError> {
    let tags = retry(retry_policy, "metadata read", || tool.read_tags(video))
        .await
        .map_err(|e| PipelineError::metadata_read(video.to_path_buf(), e))?;

    let extraction = parse_tags(&tags, hemisphere, observer);
    if extraction.attributes.is_empty() {
        tracing::warn!("No container attributes in {}", video.display());
    }
    tracing::info!(
        "Extracted {} GPS samples and {} container attributes from {}",
        extraction.samples.len(),
        extraction.attributes.len(),
        video.display()
    );
    Ok(extraction)
}

/// Splits a flat tag map into samples and container attributes.
pub fn parse_tags(
    tags: &TagMap,
    hemisphere: Hemisphere,
    observer: &dyn PipelineObserver,
) -> Extraction {
    let mut seen_offsets = HashSet::new();
    let mut samples = Vec::new();

    for document in gps_documents(tags) {
        match parse_sample(tags, &document, hemisphere) {
            Ok(sample) => {
                if seen_offsets.insert(sample.sample_offset) {
                    samples.push(sample);
                } else {
                    observer.on_event(&PipelineEvent::DuplicateSample {
                        document: &document,
                        offset: sample.sample_offset,
                    });
                }
            }
            Err(error) => observer.on_event(&PipelineEvent::SampleSkipped {
                document: &document,
                error: &error,
            }),
        }
    }

    samples.sort_by_key(|s| s.sample_offset);

    let attributes = tags
        .iter()
        .filter(|(k, _)| !k.starts_with(DOC_PREFIX))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect::<BTreeMap<_, _>>();

    Extraction {
        samples,
        attributes: ContainerAttributes::new(attributes),
    }
}

/// Document identifiers (`Doc<n>`) carrying a latitude, in document order.
fn gps_documents(tags: &TagMap) -> Vec<String> {
    let mut numbers: Vec<u64> = tags
        .keys()
        .filter_map(|k| k.strip_suffix(LATITUDE_SUFFIX))
        .filter_map(|doc| doc.strip_prefix(DOC_PREFIX))
        .filter_map(|n| n.parse().ok())
        .collect();
    numbers.sort_unstable();
    numbers.dedup();
    numbers
        .into_iter()
        .map(|n| format!("{}{}", DOC_PREFIX, n))
        .collect()
}

fn parse_sample(
    tags: &TagMap,
    document: &str,
    hemisphere: Hemisphere,
) -> Result<GpsSample, SampleParseError> {
    let tag = |name: &str| tags.get(&format!("{}:{}", document, name));
    let required = |name: &str| {
        tag(name).ok_or_else(|| SampleParseError::MissingTag(format!("{}:{}", document, name)))
    };

    let sample_offset = parse_sample_offset(required("SampleTime")?)?;
    let capture_time = match required("GPSDateTime")? {
        Value::String(s) => parse_timestamp(s)?,
        other => return Err(SampleParseError::InvalidTimestamp(other.to_string())),
    };
    let latitude = parse_coordinate(required("GPSLatitude")?, hemisphere)?;
    let longitude = parse_coordinate(required("GPSLongitude")?, hemisphere)?;
    let altitude = tag("GPSAltitude").map(parse_altitude).unwrap_or(0.0);

    Ok(GpsSample {
        capture_time,
        latitude,
        longitude,
        altitude,
        sample_offset,
    })
}

/// Parses `"<n> s"` (fractional seconds) or `"H:MM:SS"` into whole seconds.
pub fn parse_sample_offset(value: &Value) -> Result<i64, SampleParseError> {
    let seconds = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_seconds(s),
        _ => None,
    };
    seconds
        .filter(|f| f.is_finite() && *f >= 0.0 && *f < i64::MAX as f64)
        .map(|f| f.trunc() as i64)
        .ok_or_else(|| SampleParseError::InvalidSampleTime(value.to_string()))
}

/// Parses a container duration (`12.5`, `"12.5 s"`, `"0:01:23.45"`) into seconds.
pub fn parse_duration(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_seconds(s),
        _ => None,
    }
    .filter(|d| d.is_finite() && *d >= 0.0)
}

fn parse_seconds(text: &str) -> Option<f64> {
    let text = text.trim().trim_end_matches("(approx)").trim();

    if let Some(secs) = text.strip_suffix('s') {
        return secs.trim().parse().ok();
    }

    let parts: Vec<&str> = text.split(':').collect();
    if parts.len() < 2 || parts.len() > 3 {
        return text.parse().ok();
    }
    parts.iter().try_fold(0.0, |acc: f64, part| {
        let value: f64 = part.trim().parse().ok()?;
        Some(acc * 60.0 + value)
    })
}

/// Converts a sexagesimal coordinate (`37 deg 46' 29.64" N`) to decimal degrees.
///
/// Numeric values are taken as already-decimal and returned unchanged.
pub fn parse_coordinate(value: &Value, hemisphere: Hemisphere) -> Result<f64, SampleParseError> {
    let invalid = || SampleParseError::InvalidCoordinate(value.to_string());
    let text = match value {
        Value::Number(n) => return n.as_f64().ok_or_else(invalid),
        Value::String(s) => s,
        _ => return Err(invalid()),
    };

    let mut parts: Vec<&str> = text
        .split(|c| matches!(c, 'd' | 'e' | 'g' | '\'' | '"'))
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

    let direction = parts
        .last()
        .copied()
        .filter(|d| matches!(*d, "N" | "S" | "E" | "W"));
    if direction.is_some() {
        parts.pop();
    }

    if parts.is_empty() || parts.len() > 3 {
        return Err(invalid());
    }

    let mut decimal = 0.0;
    for (part, scale) in parts.iter().zip([1.0, 60.0, 3600.0]) {
        let component: f64 = part.parse().map_err(|_| invalid())?;
        decimal += component / scale;
    }
    if !decimal.is_finite() {
        return Err(invalid());
    }

    Ok(match direction {
        Some(d) => decimal * hemisphere.sign(d),
        None => decimal,
    })
}

/// First numeric token of a free-text altitude, truncated to whole meters.
pub fn parse_altitude(value: &Value) -> f64 {
    let text = match value {
        Value::Number(n) => return n.as_f64().map(f64::trunc).unwrap_or(0.0),
        Value::String(s) => s,
        _ => return 0.0,
    };

    let Some(start) = text.find(|c: char| c.is_ascii_digit()) else {
        return 0.0;
    };
    let token: String = text[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let meters = token
        .trim_end_matches('.')
        .parse::<f64>()
        .map(f64::trunc)
        .unwrap_or(0.0);

    if text.contains("Below Sea Level") {
        -meters
    } else {
        meters
    }
}

/// Parses exiftool (`2021:06:01 10:00:00.123Z`) and RFC 3339 timestamps.
/// Values without an offset are taken as UTC.
pub fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, SampleParseError> {
    let text = text.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.with_timezone(&Utc));
    }

    const WITH_OFFSET: &[&str] = &["%Y:%m:%d %H:%M:%S%.f%:z", "%Y:%m:%d %H:%M:%S%:z"];
    for format in WITH_OFFSET {
        if let Ok(dt) = DateTime::parse_from_str(text, format) {
            return Ok(dt.with_timezone(&Utc));
        }
    }

    let naive = text.strip_suffix('Z').unwrap_or(text);
    const NAIVE: &[&str] = &[
        "%Y:%m:%d %H:%M:%S%.f",
        "%Y:%m:%d %H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
    ];
    NAIVE
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(naive, format).ok())
        .map(|dt| dt.and_utc())
        .ok_or_else(|| SampleParseError::InvalidTimestamp(text.to_string()))
}
