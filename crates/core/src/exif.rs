//! EXIF read and write.
//!
//! Reading goes through kamadak-exif for every container it understands.
//! Writing is JPEG only: the primary IFD is rebuilt with the experimental
//! kamadak-exif writer and spliced back into the file as a fresh APP1
//! segment. Thumbnail (IFD1) fields are never carried over.

use std::fs;
use std::io::{BufReader, Cursor};
use std::path::Path;

use chrono::NaiveDateTime;
use exif::experimental::Writer;
use exif::{Field, In, Rational, Reader, Tag, Value};
use tracing::warn;

use crate::domain::GpsCoords;
use crate::error::{Error, Result};

const EXIF_DATE_FORMAT: &str = "%Y:%m:%d %H:%M:%S";
const EXIF_HEADER: &[u8] = b"Exif\0\0";

/// Tags the writer derives from layout. Copying them over would point
/// into the old file.
const STRUCTURAL_TAGS: [Tag; 9] = [
    Tag::ExifIFDPointer,
    Tag::GPSInfoIFDPointer,
    Tag::InteropIFDPointer,
    Tag::JPEGInterchangeFormat,
    Tag::JPEGInterchangeFormatLength,
    Tag::StripOffsets,
    Tag::StripByteCounts,
    Tag::TileOffsets,
    Tag::TileByteCounts,
];

pub fn is_writable(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| matches!(e.to_ascii_lowercase().as_str(), "jpg" | "jpeg"))
}

/// Parsed EXIF block, or `None` when the file carries none.
fn read_exif(path: &Path) -> Result<Option<exif::Exif>> {
    let file = fs::File::open(path)?;
    let mut reader = BufReader::new(file);
    match Reader::new().read_from_container(&mut reader) {
        Ok(exif) => Ok(Some(exif)),
        Err(exif::Error::NotFound(_)) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn ascii_value(field: &Field) -> Option<String> {
    match field.value {
        Value::Ascii(ref parts) => parts
            .first()
            .map(|bytes| String::from_utf8_lossy(bytes).trim_end_matches('\0').trim().to_string()),
        _ => None,
    }
}

/// `DateTimeOriginal`, falling back to the top-level `DateTime`.
pub fn read_capture_datetime(path: &Path) -> Result<Option<NaiveDateTime>> {
    let Some(exif) = read_exif(path)? else {
        return Ok(None);
    };
    let parsed = [Tag::DateTimeOriginal, Tag::DateTime]
        .into_iter()
        .filter_map(|tag| exif.get_field(tag, In::PRIMARY))
        .filter_map(ascii_value)
        .find_map(|s| NaiveDateTime::parse_from_str(&s, EXIF_DATE_FORMAT).ok());
    Ok(parsed)
}

pub fn read_gps(path: &Path) -> Result<Option<GpsCoords>> {
    let Some(exif) = read_exif(path)? else {
        return Ok(None);
    };
    let get = |tag| exif.get_field(tag, In::PRIMARY);
    let (Some(lat), Some(lat_ref), Some(lon), Some(lon_ref)) = (
        get(Tag::GPSLatitude),
        get(Tag::GPSLatitudeRef),
        get(Tag::GPSLongitude),
        get(Tag::GPSLongitudeRef),
    ) else {
        return Ok(None);
    };

    let (Some(lat_abs), Some(lon_abs)) = (dms_to_decimal(&lat.value), dms_to_decimal(&lon.value))
    else {
        return Ok(None);
    };
    let south = ascii_value(lat_ref).is_some_and(|r| r.starts_with('S'));
    let west = ascii_value(lon_ref).is_some_and(|r| r.starts_with('W'));

    Ok(Some(GpsCoords::new(
        if south { -lat_abs } else { lat_abs },
        if west { -lon_abs } else { lon_abs },
    )))
}

fn dms_to_decimal(value: &Value) -> Option<f64> {
    match value {
        Value::Rational(v) if v.len() >= 3 => {
            Some(v[0].to_f64() + v[1].to_f64() / 60.0 + v[2].to_f64() / 3600.0)
        }
        _ => None,
    }
}

fn decimal_to_dms(value: f64) -> Vec<Rational> {
    let value = value.abs();
    let degrees = value.trunc();
    let minutes_full = (value - degrees) * 60.0;
    let minutes = minutes_full.trunc();
    let seconds = (minutes_full - minutes) * 60.0;
    vec![
        Rational { num: degrees as u32, denom: 1 },
        Rational { num: minutes as u32, denom: 1 },
        Rational { num: (seconds * 100.0).round() as u32, denom: 100 },
    ]
}

/// Set `DateTime`, `DateTimeOriginal` and `DateTimeDigitized` to `datetime`.
pub fn write_capture_datetime(path: &Path, datetime: NaiveDateTime) -> Result<()> {
    let value = Value::Ascii(vec![datetime.format(EXIF_DATE_FORMAT).to_string().into_bytes()]);
    let fields = [Tag::DateTime, Tag::DateTimeOriginal, Tag::DateTimeDigitized]
        .into_iter()
        .map(|tag| Field {
            tag,
            ifd_num: In::PRIMARY,
            value: value.clone(),
        })
        .collect();
    rewrite_exif(path, fields)
}

pub fn write_gps(path: &Path, gps: GpsCoords) -> Result<()> {
    let lat_ref: &[u8] = if gps.lat < 0.0 { b"S" } else { b"N" };
    let lon_ref: &[u8] = if gps.lon < 0.0 { b"W" } else { b"E" };
    let field = |tag, value| Field {
        tag,
        ifd_num: In::PRIMARY,
        value,
    };
    let fields = vec![
        field(Tag::GPSVersionID, Value::Byte(vec![2, 2, 0, 0])),
        field(Tag::GPSLatitudeRef, Value::Ascii(vec![lat_ref.to_vec()])),
        field(Tag::GPSLatitude, Value::Rational(decimal_to_dms(gps.lat))),
        field(Tag::GPSLongitudeRef, Value::Ascii(vec![lon_ref.to_vec()])),
        field(Tag::GPSLongitude, Value::Rational(decimal_to_dms(gps.lon))),
    ];
    rewrite_exif(path, fields)
}

/// Rebuild the primary IFD with `replacements` overriding same-tag fields,
/// then replace the file's EXIF segment. The file is rewritten through a
/// sibling temp file and a rename.
fn rewrite_exif(path: &Path, replacements: Vec<Field>) -> Result<()> {
    if !is_writable(path) {
        return Err(Error::WriteUnsupported(path.to_path_buf()));
    }
    let data = fs::read(path)?;
    if !data.starts_with(&[0xFF, 0xD8]) {
        return Err(Error::NotJpeg(path.to_path_buf()));
    }

    // A damaged block is replaced by a fresh one holding only the new fields.
    let existing = match Reader::new().read_from_container(&mut Cursor::new(data.as_slice())) {
        Ok(exif) => Some(exif),
        Err(exif::Error::NotFound(_)) => None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "unreadable EXIF block, starting from scratch");
            None
        }
    };
    let little_endian = existing.as_ref().is_some_and(|e| e.little_endian());

    let mut writer = Writer::new();
    if let Some(ref exif) = existing {
        for field in exif.fields() {
            let keep = field.ifd_num == In::PRIMARY
                && !matches!(field.value, Value::Unknown(..))
                && !STRUCTURAL_TAGS.contains(&field.tag)
                && !replacements.iter().any(|r| r.tag == field.tag);
            if keep {
                writer.push_field(field);
            }
        }
    }
    for field in &replacements {
        writer.push_field(field);
    }

    let mut tiff = Cursor::new(Vec::new());
    writer.write(&mut tiff, little_endian)?;

    let mut payload = EXIF_HEADER.to_vec();
    payload.extend_from_slice(tiff.get_ref());
    if payload.len() + 2 > u16::MAX as usize {
        return Err(Error::ExifTooLarge(path.to_path_buf()));
    }

    let spliced = splice_exif_segment(&data, &payload).ok_or_else(|| Error::NotJpeg(path.to_path_buf()))?;

    replace_file(path, &spliced)
}

/// Write `bytes` to a sibling temp file, then rename it over `path`. The
/// temp file never outlives a failure.
fn replace_file(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("exif-tmp");
    let written = fs::write(&tmp, bytes).and_then(|()| fs::rename(&tmp, path));
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

/// Copy `jpeg` with every existing EXIF APP1 segment dropped and a new one
/// built from `payload` placed after SOI and any leading APP0 segments.
/// Returns `None` when the marker structure is broken.
fn splice_exif_segment(jpeg: &[u8], payload: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(jpeg.len() + payload.len() + 4);
    out.extend_from_slice(&jpeg[..2]);

    let mut segment = Vec::with_capacity(payload.len() + 4);
    segment.extend_from_slice(&[0xFF, 0xE1]);
    segment.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
    segment.extend_from_slice(payload);
    let mut inserted = false;

    let mut pos = 2;
    loop {
        if pos + 1 >= jpeg.len() || jpeg[pos] != 0xFF {
            return None;
        }
        let marker = jpeg[pos + 1];
        if marker == 0xFF {
            // fill byte
            pos += 1;
            continue;
        }
        if !inserted && marker != 0xE0 {
            out.extend_from_slice(&segment);
            inserted = true;
        }
        // Start of scan or end of image: the rest is entropy-coded data.
        if marker == 0xDA || marker == 0xD9 {
            out.extend_from_slice(&jpeg[pos..]);
            return Some(out);
        }
        // Standalone markers carry no length.
        if marker == 0x01 || (0xD0..=0xD7).contains(&marker) {
            out.extend_from_slice(&jpeg[pos..pos + 2]);
            pos += 2;
            continue;
        }
        if pos + 4 > jpeg.len() {
            return None;
        }
        let len = u16::from_be_bytes([jpeg[pos + 2], jpeg[pos + 3]]) as usize;
        let end = pos + 2 + len;
        if len < 2 || end > jpeg.len() {
            return None;
        }
        let is_exif = marker == 0xE1 && jpeg[pos + 4..end].starts_with(EXIF_HEADER);
        if !is_exif {
            out.extend_from_slice(&jpeg[pos..end]);
        }
        pos = end;
    }
}
