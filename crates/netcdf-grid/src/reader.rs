//! NetCDF classic (CDF-1/CDF-2) header and data parsing.
//!
//! Implements the classic file layout: magic, record count, dimension list,
//! global attribute list, variable list, then fixed-size variable data at
//! each variable's `begin` offset. All integers are big-endian. Only
//! fixed-size dimensions are accepted; the pipeline never writes record
//! (unlimited) dimensions, so files that use them are rejected outright.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use tracing::debug;

use crate::error::{GridError, GridResult};
use crate::GridData;

const NC_DIMENSION: u32 = 0x0A;
const NC_VARIABLE: u32 = 0x0B;
const NC_ATTRIBUTE: u32 = 0x0C;

pub(crate) const NC_BYTE: u32 = 1;
pub(crate) const NC_CHAR: u32 = 2;
pub(crate) const NC_SHORT: u32 = 3;
pub(crate) const NC_INT: u32 = 4;
pub(crate) const NC_FLOAT: u32 = 5;
pub(crate) const NC_DOUBLE: u32 = 6;

const STREAMING_NUMRECS: u32 = 0xFFFF_FFFF;

fn type_size(nc_type: u32) -> GridResult<usize> {
    match nc_type {
        NC_BYTE | NC_CHAR => Ok(1),
        NC_SHORT => Ok(2),
        NC_INT | NC_FLOAT => Ok(4),
        NC_DOUBLE => Ok(8),
        other => Err(GridError::InvalidFormat(format!(
            "unknown external type {}",
            other
        ))),
    }
}

/// Round a byte count up to the 4-byte alignment the format requires.
fn round4(n: usize) -> usize {
    (n + 3) & !3
}

// ===== Byte cursor =====

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize, what: &str) -> GridResult<&'a [u8]> {
        if self.pos + n > self.data.len() {
            return Err(GridError::InvalidFormat(format!(
                "truncated file while reading {}",
                what
            )));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u32(&mut self, what: &str) -> GridResult<u32> {
        let b = self.take(4, what)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self, what: &str) -> GridResult<u64> {
        let b = self.take(8, what)?;
        Ok(u64::from_be_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    /// Read a name: length, bytes, padding to a 4-byte boundary.
    fn name(&mut self) -> GridResult<String> {
        let len = self.u32("name length")? as usize;
        let bytes = self.take(round4(len), "name")?;
        String::from_utf8(bytes[..len].to_vec())
            .map_err(|_| GridError::InvalidFormat("name is not valid UTF-8".to_string()))
    }
}

// ===== Header model =====

#[derive(Debug)]
struct Dim {
    name: String,
    len: usize,
}

#[derive(Debug, Clone)]
enum AttrValue {
    Text(String),
    Bytes(Vec<i8>),
    Shorts(Vec<i16>),
    Ints(Vec<i32>),
    Floats(Vec<f32>),
    Doubles(Vec<f64>),
}

impl AttrValue {
    fn first_f64(&self) -> Option<f64> {
        match self {
            AttrValue::Bytes(v) => v.first().map(|&x| x as f64),
            AttrValue::Shorts(v) => v.first().map(|&x| x as f64),
            AttrValue::Ints(v) => v.first().map(|&x| x as f64),
            AttrValue::Floats(v) => v.first().map(|&x| x as f64),
            AttrValue::Doubles(v) => v.first().copied(),
            AttrValue::Text(_) => None,
        }
    }

    fn as_text(&self) -> Option<&str> {
        match self {
            AttrValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct Attr {
    name: String,
    value: AttrValue,
}

#[derive(Debug)]
struct Var {
    name: String,
    dimids: Vec<usize>,
    attrs: Vec<Attr>,
    nc_type: u32,
    begin: u64,
}

impl Var {
    fn attr(&self, name: &str) -> Option<&AttrValue> {
        self.attrs.iter().find(|a| a.name == name).map(|a| &a.value)
    }
}

// ===== List parsing =====

/// Read a tag/count pair heading one of the header lists. An absent list is
/// encoded as two zero words.
fn tagged_count(cur: &mut Cursor, expected: u32, what: &str) -> GridResult<usize> {
    let tag = cur.u32(what)?;
    let count = cur.u32(what)? as usize;
    if tag == 0 && count == 0 {
        return Ok(0);
    }
    if tag != expected {
        return Err(GridError::InvalidFormat(format!(
            "bad {} list tag 0x{:x}",
            what, tag
        )));
    }
    Ok(count)
}

fn parse_attr(cur: &mut Cursor) -> GridResult<Attr> {
    let name = cur.name()?;
    let nc_type = cur.u32("attribute type")?;
    let nelems = cur.u32("attribute count")? as usize;
    let size = type_size(nc_type)?;
    let raw = cur.take(round4(nelems * size), "attribute values")?;
    let raw = &raw[..nelems * size];

    let value = match nc_type {
        NC_CHAR => AttrValue::Text(String::from_utf8_lossy(raw).into_owned()),
        NC_BYTE => AttrValue::Bytes(raw.iter().map(|&b| b as i8).collect()),
        NC_SHORT => AttrValue::Shorts(
            raw.chunks_exact(2)
                .map(|c| i16::from_be_bytes([c[0], c[1]]))
                .collect(),
        ),
        NC_INT => AttrValue::Ints(
            raw.chunks_exact(4)
                .map(|c| i32::from_be_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        ),
        NC_FLOAT => AttrValue::Floats(
            raw.chunks_exact(4)
                .map(|c| f32::from_be_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        ),
        NC_DOUBLE => AttrValue::Doubles(
            raw.chunks_exact(8)
                .map(|c| {
                    f64::from_be_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]])
                })
                .collect(),
        ),
        other => {
            return Err(GridError::InvalidFormat(format!(
                "unknown attribute type {}",
                other
            )))
        }
    };

    Ok(Attr { name, value })
}

fn parse_attr_list(cur: &mut Cursor) -> GridResult<Vec<Attr>> {
    let count = tagged_count(cur, NC_ATTRIBUTE, "attribute")?;
    let mut attrs = Vec::with_capacity(count);
    for _ in 0..count {
        attrs.push(parse_attr(cur)?);
    }
    Ok(attrs)
}

// ===== File parsing =====

pub(crate) fn parse(data: &[u8]) -> GridResult<GridData> {
    if data.len() >= 4 && &data[0..4] == b"\x89HDF" {
        return Err(GridError::Unsupported(
            "NetCDF-4/HDF5 container (classic format required)".to_string(),
        ));
    }
    if data.len() < 4 || &data[0..3] != b"CDF" {
        return Err(GridError::InvalidFormat("bad magic bytes".to_string()));
    }

    let version = data[3];
    let wide_offsets = match version {
        1 => false,
        2 => true,
        other => {
            return Err(GridError::Unsupported(format!(
                "classic format version {}",
                other
            )))
        }
    };

    let mut cur = Cursor::new(data);
    cur.pos = 4;

    let numrecs = cur.u32("record count")?;
    if numrecs == STREAMING_NUMRECS {
        return Err(GridError::Unsupported("streaming record count".to_string()));
    }

    // Dimension list
    let ndims = tagged_count(&mut cur, NC_DIMENSION, "dimension")?;
    let mut dims = Vec::with_capacity(ndims);
    for _ in 0..ndims {
        let name = cur.name()?;
        let len = cur.u32("dimension length")? as usize;
        dims.push(Dim { name, len });
    }

    // Global attributes are parsed for well-formedness but otherwise unused.
    let _gatts = parse_attr_list(&mut cur)?;

    // Variable list
    let nvars = tagged_count(&mut cur, NC_VARIABLE, "variable")?;
    let mut vars = Vec::with_capacity(nvars);
    for _ in 0..nvars {
        let name = cur.name()?;
        let nd = cur.u32("variable rank")? as usize;
        let mut dimids = Vec::with_capacity(nd);
        for _ in 0..nd {
            dimids.push(cur.u32("dimension id")? as usize);
        }
        let attrs = parse_attr_list(&mut cur)?;
        let nc_type = cur.u32("variable type")?;
        let _vsize = cur.u32("variable size")?;
        let begin = if wide_offsets {
            cur.u64("variable offset")?
        } else {
            cur.u32("variable offset")? as u64
        };

        for &id in &dimids {
            if id >= dims.len() {
                return Err(GridError::InvalidFormat(format!(
                    "variable {} references unknown dimension {}",
                    name, id
                )));
            }
        }

        vars.push(Var {
            name,
            dimids,
            attrs,
            nc_type,
            begin,
        });
    }

    interpret(data, &dims, &vars)
}

/// Map the parsed header onto the pipeline's (time, lat, lon) grid model.
fn interpret(data: &[u8], dims: &[Dim], vars: &[Var]) -> GridResult<GridData> {
    let dim_id = |name: &str| -> GridResult<usize> {
        dims.iter()
            .position(|d| d.name == name)
            .ok_or_else(|| GridError::MissingData(format!("dimension '{}'", name)))
    };

    let time_id = dim_id("time")?;
    let lat_id = dim_id("lat")?;
    let lon_id = dim_id("lon")?;

    for &id in &[time_id, lat_id, lon_id] {
        if dims[id].len == 0 {
            return Err(GridError::Unsupported(format!(
                "record (unlimited) dimension '{}'",
                dims[id].name
            )));
        }
    }

    let ntime = dims[time_id].len;
    let nlat = dims[lat_id].len;
    let nlon = dims[lon_id].len;

    let ncells = ntime
        .checked_mul(nlat)
        .and_then(|n| n.checked_mul(nlon))
        .ok_or_else(|| {
            GridError::InvalidFormat("dimension sizes overflow the cell count".to_string())
        })?;

    let coord_var = |name: &str, dim: usize| -> GridResult<&Var> {
        vars.iter()
            .find(|v| v.name == name && v.dimids == [dim])
            .ok_or_else(|| GridError::MissingData(format!("coordinate variable '{}'", name)))
    };

    let lat_var = coord_var("lat", lat_id)?;
    let lon_var = coord_var("lon", lon_id)?;
    let time_var = coord_var("time", time_id)?;

    let lats = read_f64_values(data, lat_var, nlat)?;
    let lons = read_f64_values(data, lon_var, nlon)?;
    let time_raw = read_f64_values(data, time_var, ntime)?;
    let times = decode_times(&time_raw, time_var.attr("units").and_then(|a| a.as_text()))?;

    // The data variable is the (time, lat, lon) field that is not itself a
    // coordinate. Exactly one is expected in pipeline files.
    let data_var = vars
        .iter()
        .find(|v| {
            v.dimids == [time_id, lat_id, lon_id]
                && !matches!(v.name.as_str(), "time" | "lat" | "lon")
        })
        .ok_or_else(|| {
            GridError::MissingData("data variable over (time, lat, lon)".to_string())
        })?;

    let values = read_field_values(data, data_var, ncells)?;

    debug!(
        variable = %data_var.name,
        ntime,
        nlat,
        nlon,
        "parsed grid file"
    );

    GridData::new(data_var.name.clone(), times, lats, lons, values)
}

/// Decode raw elements of any numeric external type as f64.
fn read_f64_values(data: &[u8], var: &Var, count: usize) -> GridResult<Vec<f64>> {
    let raw = raw_slice(data, var, count)?;
    let mut out = Vec::with_capacity(count);
    match var.nc_type {
        NC_BYTE => out.extend(raw.iter().map(|&b| b as i8 as f64)),
        NC_SHORT => out.extend(
            raw.chunks_exact(2)
                .map(|c| i16::from_be_bytes([c[0], c[1]]) as f64),
        ),
        NC_INT => out.extend(
            raw.chunks_exact(4)
                .map(|c| i32::from_be_bytes([c[0], c[1], c[2], c[3]]) as f64),
        ),
        NC_FLOAT => out.extend(
            raw.chunks_exact(4)
                .map(|c| f32::from_be_bytes([c[0], c[1], c[2], c[3]]) as f64),
        ),
        NC_DOUBLE => out.extend(raw.chunks_exact(8).map(|c| {
            f64::from_be_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]])
        })),
        other => {
            return Err(GridError::Unsupported(format!(
                "coordinate variable '{}' of type {}",
                var.name, other
            )))
        }
    }
    Ok(out)
}

/// Decode the data field to f32, applying `_FillValue`, `scale_factor`, and
/// `add_offset`. Fill cells become NaN.
fn read_field_values(data: &[u8], var: &Var, count: usize) -> GridResult<Vec<f32>> {
    let raw = raw_slice(data, var, count)?;
    let fill = var
        .attr("_FillValue")
        .or_else(|| var.attr("missing_value"))
        .and_then(|a| a.first_f64());
    let scale = var
        .attr("scale_factor")
        .and_then(|a| a.first_f64())
        .unwrap_or(1.0);
    let offset = var
        .attr("add_offset")
        .and_then(|a| a.first_f64())
        .unwrap_or(0.0);

    let unpack = |v: f64| -> f32 {
        if fill.map_or(false, |f| v == f) || !v.is_finite() {
            f32::NAN
        } else {
            (v * scale + offset) as f32
        }
    };

    let mut out = Vec::with_capacity(count);
    match var.nc_type {
        NC_SHORT => out.extend(
            raw.chunks_exact(2)
                .map(|c| unpack(i16::from_be_bytes([c[0], c[1]]) as f64)),
        ),
        NC_INT => out.extend(
            raw.chunks_exact(4)
                .map(|c| unpack(i32::from_be_bytes([c[0], c[1], c[2], c[3]]) as f64)),
        ),
        NC_FLOAT => out.extend(
            raw.chunks_exact(4)
                .map(|c| unpack(f32::from_be_bytes([c[0], c[1], c[2], c[3]]) as f64)),
        ),
        NC_DOUBLE => out.extend(raw.chunks_exact(8).map(|c| {
            unpack(f64::from_be_bytes([
                c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7],
            ]))
        })),
        other => {
            return Err(GridError::Unsupported(format!(
                "data variable '{}' of type {}",
                var.name, other
            )))
        }
    }
    Ok(out)
}

fn raw_slice<'a>(data: &'a [u8], var: &Var, count: usize) -> GridResult<&'a [u8]> {
    let size = type_size(var.nc_type)?;
    // All arithmetic in u64: `begin` comes straight from the file and may
    // be arbitrarily large in a corrupt download.
    let end = (count as u64)
        .checked_mul(size as u64)
        .and_then(|nbytes| var.begin.checked_add(nbytes))
        .filter(|&end| end <= data.len() as u64)
        .ok_or_else(|| {
            GridError::InvalidFormat(format!(
                "variable '{}' data extends past end of file",
                var.name
            ))
        })?;
    Ok(&data[var.begin as usize..end as usize])
}

/// Decode a CF-style time coordinate ("<unit> since <epoch>").
///
/// Values with no units attribute are taken as Unix seconds.
fn decode_times(raw: &[f64], units: Option<&str>) -> GridResult<Vec<DateTime<Utc>>> {
    let (mult, epoch) = match units.and_then(parse_time_units) {
        Some(parsed) => parsed,
        None => (1.0, NaiveDateTime::UNIX_EPOCH),
    };

    let epoch = epoch.and_utc();
    raw.iter()
        .map(|&v| {
            if !v.is_finite() {
                return Err(GridError::InvalidFormat(
                    "non-finite time coordinate".to_string(),
                ));
            }
            let millis = (v * mult * 1000.0).round() as i64;
            Ok(epoch + Duration::milliseconds(millis))
        })
        .collect()
}

fn parse_time_units(units: &str) -> Option<(f64, NaiveDateTime)> {
    let mut parts = units.splitn(2, " since ");
    let unit = parts.next()?.trim().to_ascii_lowercase();
    let epoch_str = parts.next()?.trim().trim_end_matches('Z');

    let mult = match unit.as_str() {
        "seconds" | "second" | "secs" | "sec" | "s" => 1.0,
        "minutes" | "minute" | "mins" | "min" => 60.0,
        "hours" | "hour" | "hrs" | "hr" | "h" => 3600.0,
        "days" | "day" | "d" => 86400.0,
        _ => return None,
    };

    let epoch = NaiveDateTime::parse_from_str(epoch_str, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(epoch_str, "%Y-%m-%dT%H:%M:%S"))
        .or_else(|_| {
            NaiveDateTime::parse_from_str(&format!("{} 00:00:00", epoch_str), "%Y-%m-%d %H:%M:%S")
        })
        .ok()?;

    Some((mult, epoch))
}
