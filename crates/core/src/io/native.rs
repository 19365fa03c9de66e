//! Native GeoTIFF reading/writing
//!
//! Uses the `tiff` crate. Georeferencing is carried by the
//! ModelPixelScale/ModelTiepoint tags, the GDAL no-data tag and the EPSG
//! entry of the GeoKey directory.

use super::RasterProfile;
use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster};
use std::fs::File;
use std::io::{BufReader, BufWriter, Cursor};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::colortype::Gray32Float;
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;

const GT_MODEL_TYPE_KEY: u16 = 1024;
const GT_RASTER_TYPE_KEY: u16 = 1025;
const GEOGRAPHIC_TYPE_KEY: u16 = 2048;
const PROJECTED_CS_TYPE_KEY: u16 = 3072;

/// Read band 1 of a GeoTIFF file into a Raster named after the file stem
pub fn read_geotiff<P: AsRef<Path>>(path: P) -> Result<Raster> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let raster = decode_geotiff(BufReader::new(file), path)?;
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(raster.with_name(name))
}

/// Read a GeoTIFF from an in-memory buffer
pub fn read_geotiff_from_buffer(data: &[u8]) -> Result<Raster> {
    decode_geotiff(Cursor::new(data), Path::new("<buffer>"))
}

fn decode_geotiff<R>(reader: R, path: &Path) -> Result<Raster>
where
    R: std::io::Read + std::io::Seek,
{
    let mut decoder = Decoder::new(reader).map_err(|e| Error::tiff(path, e))?;

    let (width, height) = decoder.dimensions().map_err(|e| Error::tiff(path, e))?;
    let rows = height as usize;
    let cols = width as usize;

    let samples: Vec<f64> = match decoder.read_image().map_err(|e| Error::tiff(path, e))? {
        DecodingResult::F32(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::F64(buf) => buf,
        DecodingResult::U8(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::U16(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::U32(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I8(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I16(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I32(buf) => buf.into_iter().map(f64::from).collect(),
        _ => return Err(Error::tiff(path, "unsupported pixel format")),
    };

    let cells = rows * cols;
    if cells == 0 || samples.len() % cells != 0 {
        return Err(Error::InvalidDimensions {
            width: cols,
            height: rows,
        });
    }

    // Chunky multi-sample images: keep the first sample of each pixel
    let stride = samples.len() / cells;
    let data = if stride == 1 {
        samples
    } else {
        samples.into_iter().step_by(stride).collect()
    };

    let mut raster = Raster::from_vec(data, rows, cols)?;

    match read_geotransform(&mut decoder) {
        Some(transform) => raster.set_transform(transform),
        None => return Err(Error::tiff(path, "missing georeferencing tags")),
    }
    raster.set_nodata(read_nodata(&mut decoder));
    raster.set_crs(read_crs(&mut decoder));

    Ok(raster)
}

fn read_geotransform<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
) -> Option<GeoTransform> {
    let scale = decoder.get_tag_f64_vec(Tag::ModelPixelScaleTag).ok()?;
    let tiepoint = decoder.get_tag_f64_vec(Tag::ModelTiepointTag).ok()?;

    if scale.len() < 2 || tiepoint.len() < 6 {
        return None;
    }

    // tiepoint: [I, J, K, X, Y, Z], scale: [ScaleX, ScaleY, ScaleZ]
    let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
    let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
    Some(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]))
}

fn read_nodata<R: std::io::Read + std::io::Seek>(decoder: &mut Decoder<R>) -> Option<f64> {
    let text = decoder.get_tag_ascii_string(Tag::GdalNodata).ok()?;
    text.trim_matches(char::from(0)).trim().parse::<f64>().ok()
}

fn read_crs<R: std::io::Read + std::io::Seek>(decoder: &mut Decoder<R>) -> Option<CRS> {
    let keys = decoder.get_tag_u16_vec(Tag::GeoKeyDirectoryTag).ok()?;
    if keys.len() < 4 {
        return None;
    }

    let entries: Vec<&[u16]> = keys[4..].chunks_exact(4).collect();
    // Entries stored inline have location 0; value sits in the last slot
    let inline = |id: u16| {
        entries
            .iter()
            .find(|e| e[0] == id && e[1] == 0)
            .map(|e| e[3])
    };

    inline(PROJECTED_CS_TYPE_KEY)
        .or_else(|| inline(GEOGRAPHIC_TYPE_KEY))
        .filter(|&code| code != 0 && code != 32767)
        .map(|code| CRS::Epsg(u32::from(code)))
}

/// Write a Raster to a single-band float32 GeoTIFF
pub fn write_geotiff<P: AsRef<Path>>(raster: &Raster, path: P, profile: &RasterProfile) -> Result<()> {
    let path = path.as_ref();
    profile.validate_for(raster)?;
    let file = File::create(path)?;
    encode_geotiff(raster, profile, BufWriter::new(file), path)
}

/// Write a Raster to an in-memory GeoTIFF buffer
pub fn write_geotiff_to_buffer(raster: &Raster, profile: &RasterProfile) -> Result<Vec<u8>> {
    profile.validate_for(raster)?;
    let mut buf = Vec::new();
    encode_geotiff(raster, profile, Cursor::new(&mut buf), Path::new("<buffer>"))?;
    Ok(buf)
}

fn encode_geotiff<W>(raster: &Raster, profile: &RasterProfile, writer: W, path: &Path) -> Result<()>
where
    W: std::io::Write + std::io::Seek,
{
    let mut encoder = TiffEncoder::new(writer).map_err(|e| Error::tiff(path, e))?;

    let data: Vec<f32> = raster.data().iter().map(|&v| v as f32).collect();

    let mut image = encoder
        .new_image::<Gray32Float>(profile.width as u32, profile.height as u32)
        .map_err(|e| Error::tiff(path, e))?;

    let gt = &profile.transform;

    let scale = [gt.pixel_width, gt.pixel_height.abs(), 0.0];
    image
        .encoder()
        .write_tag(Tag::ModelPixelScaleTag, &scale[..])
        .map_err(|e| Error::tiff(path, e))?;

    let tiepoint = [0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
    image
        .encoder()
        .write_tag(Tag::ModelTiepointTag, &tiepoint[..])
        .map_err(|e| Error::tiff(path, e))?;

    let geokeys = geo_keys(profile.crs.as_ref());
    image
        .encoder()
        .write_tag(Tag::GeoKeyDirectoryTag, &geokeys[..])
        .map_err(|e| Error::tiff(path, e))?;

    if let Some(nodata) = profile.nodata {
        let text = if nodata.is_nan() {
            "nan".to_string()
        } else {
            format!("{:e}", nodata)
        };
        image
            .encoder()
            .write_tag(Tag::GdalNodata, text.as_str())
            .map_err(|e| Error::tiff(path, e))?;
    }

    image.write_data(&data).map_err(|e| Error::tiff(path, e))?;

    Ok(())
}

/// GeoKey directory: version header, model type, raster type, CRS code
fn geo_keys(crs: Option<&CRS>) -> Vec<u16> {
    let code = crs
        .and_then(CRS::epsg)
        .and_then(|c| u16::try_from(c).ok());
    let geographic = crs.map_or(false, CRS::is_geographic);

    let mut keys = vec![1, 1, 0, 2];
    keys.extend_from_slice(&[GT_MODEL_TYPE_KEY, 0, 1, if geographic { 2 } else { 1 }]);
    keys.extend_from_slice(&[GT_RASTER_TYPE_KEY, 0, 1, 1]);

    if let Some(code) = code {
        let key = if geographic {
            GEOGRAPHIC_TYPE_KEY
        } else {
            PROJECTED_CS_TYPE_KEY
        };
        keys.extend_from_slice(&[key, 0, 1, code]);
        keys[3] = 3;
    }
    keys
}
