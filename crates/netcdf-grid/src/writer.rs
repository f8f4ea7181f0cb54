//! NetCDF classic (CDF-1) encoding for pipeline grid slots.
//!
//! Emits a fixed layout: dims `time`, `lat`, `lon`; double coordinate
//! variables; one float data variable with a `_FillValue`. Coordinate arrays
//! are written bit-exactly as held in memory, so a crop-and-save round trip
//! never drifts the coordinates.

use bytes::BufMut;

use crate::reader::{NC_CHAR, NC_DOUBLE, NC_FLOAT};
use crate::GridData;

const NC_DIMENSION: u32 = 0x0A;
const NC_VARIABLE: u32 = 0x0B;
const NC_ATTRIBUTE: u32 = 0x0C;

/// Default fill value for float data, matching the netcdf library's
/// NC_FILL_FLOAT. Non-finite cells are written as this value.
pub(crate) const FILL_F32: f32 = 9.96921e36;

const TIME_UNITS: &str = "seconds since 1970-01-01 00:00:00";

fn round4(n: usize) -> usize {
    (n + 3) & !3
}

fn put_name(buf: &mut Vec<u8>, name: &str) {
    buf.put_u32(name.len() as u32);
    buf.put_slice(name.as_bytes());
    for _ in name.len()..round4(name.len()) {
        buf.put_u8(0);
    }
}

fn put_text_attr(buf: &mut Vec<u8>, name: &str, text: &str) {
    put_name(buf, name);
    buf.put_u32(NC_CHAR);
    buf.put_u32(text.len() as u32);
    buf.put_slice(text.as_bytes());
    for _ in text.len()..round4(text.len()) {
        buf.put_u8(0);
    }
}

fn put_f32_attr(buf: &mut Vec<u8>, name: &str, value: f32) {
    put_name(buf, name);
    buf.put_u32(NC_FLOAT);
    buf.put_u32(1);
    buf.put_f32(value);
}

fn put_attr_list_header(buf: &mut Vec<u8>, count: u32) {
    if count == 0 {
        buf.put_u32(0);
        buf.put_u32(0);
    } else {
        buf.put_u32(NC_ATTRIBUTE);
        buf.put_u32(count);
    }
}

/// One variable header entry. Returns the byte position of the `begin`
/// word so the caller can patch it once data offsets are known.
fn put_var_header(
    buf: &mut Vec<u8>,
    name: &str,
    dimids: &[u32],
    nc_type: u32,
    vsize: u32,
    write_attrs: impl FnOnce(&mut Vec<u8>),
) -> usize {
    put_name(buf, name);
    buf.put_u32(dimids.len() as u32);
    for &id in dimids {
        buf.put_u32(id);
    }
    write_attrs(buf);
    buf.put_u32(nc_type);
    buf.put_u32(vsize);
    let begin_pos = buf.len();
    buf.put_u32(0); // patched later
    begin_pos
}

fn patch_begin(buf: &mut Vec<u8>, pos: usize, begin: u32) {
    buf[pos..pos + 4].copy_from_slice(&begin.to_be_bytes());
}

pub(crate) fn encode(grid: &GridData) -> Vec<u8> {
    let ntime = grid.ntime();
    let nlat = grid.nlat();
    let nlon = grid.nlon();

    let mut buf: Vec<u8> = Vec::new();
    buf.put_slice(b"CDF\x01");
    buf.put_u32(0); // numrecs: all dimensions are fixed

    // Dimension list: time=0, lat=1, lon=2
    buf.put_u32(NC_DIMENSION);
    buf.put_u32(3);
    put_name(&mut buf, "time");
    buf.put_u32(ntime as u32);
    put_name(&mut buf, "lat");
    buf.put_u32(nlat as u32);
    put_name(&mut buf, "lon");
    buf.put_u32(nlon as u32);

    // Global attributes
    put_attr_list_header(&mut buf, 1);
    put_text_attr(&mut buf, "Conventions", "CF-1.6");

    // Variable list
    buf.put_u32(NC_VARIABLE);
    buf.put_u32(4);

    let time_vsize = round4(ntime * 8) as u32;
    let lat_vsize = round4(nlat * 8) as u32;
    let lon_vsize = round4(nlon * 8) as u32;
    let data_vsize = round4(ntime * nlat * nlon * 4) as u32;

    let time_begin_pos = put_var_header(&mut buf, "time", &[0], NC_DOUBLE, time_vsize, |b| {
        put_attr_list_header(b, 1);
        put_text_attr(b, "units", TIME_UNITS);
    });
    let lat_begin_pos = put_var_header(&mut buf, "lat", &[1], NC_DOUBLE, lat_vsize, |b| {
        put_attr_list_header(b, 1);
        put_text_attr(b, "units", "degrees_north");
    });
    let lon_begin_pos = put_var_header(&mut buf, "lon", &[2], NC_DOUBLE, lon_vsize, |b| {
        put_attr_list_header(b, 1);
        put_text_attr(b, "units", "degrees_east");
    });
    let data_begin_pos = put_var_header(
        &mut buf,
        &grid.variable,
        &[0, 1, 2],
        NC_FLOAT,
        data_vsize,
        |b| {
            put_attr_list_header(b, 1);
            put_f32_attr(b, "_FillValue", FILL_F32);
        },
    );

    // Data offsets follow the header in declaration order.
    let header_len = buf.len() as u32;
    let time_begin = header_len;
    let lat_begin = time_begin + time_vsize;
    let lon_begin = lat_begin + lat_vsize;
    let data_begin = lon_begin + lon_vsize;

    patch_begin(&mut buf, time_begin_pos, time_begin);
    patch_begin(&mut buf, lat_begin_pos, lat_begin);
    patch_begin(&mut buf, lon_begin_pos, lon_begin);
    patch_begin(&mut buf, data_begin_pos, data_begin);

    // Variable data, each section padded to 4 bytes.
    for t in &grid.times {
        buf.put_f64(t.timestamp_millis() as f64 / 1000.0);
    }
    pad_to(&mut buf, time_begin + time_vsize);

    for &lat in &grid.lats {
        buf.put_f64(lat);
    }
    pad_to(&mut buf, lat_begin + lat_vsize);

    for &lon in &grid.lons {
        buf.put_f64(lon);
    }
    pad_to(&mut buf, lon_begin + lon_vsize);

    for &v in &grid.values {
        buf.put_f32(if v.is_finite() { v } else { FILL_F32 });
    }
    pad_to(&mut buf, data_begin + data_vsize);

    buf
}

fn pad_to(buf: &mut Vec<u8>, target: u32) {
    while (buf.len() as u32) < target {
        buf.put_u8(0);
    }
}
