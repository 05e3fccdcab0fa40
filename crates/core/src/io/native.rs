//! Native GeoTIFF reading/writing
//!
//! Uses the `tiff` crate. Georeferencing is carried by the pixel scale and
//! tiepoint tags, the CRS by an EPSG code in the GeoKey directory and the
//! no-data value by the GDAL_NODATA ASCII tag.

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{DataType, GeoTransform, Raster, RasterElement};
use std::fs::File;
use std::io::{BufWriter, Read, Seek, Write};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::colortype::{self, ColorType as EncoderColorType};
use tiff::encoder::{TiffEncoder, TiffValue};
use tiff::tags::Tag;
use tiff::ColorType;

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GDAL_NODATA: u16 = 42113;

const GT_MODEL_TYPE_KEY: u32 = 1024;
const GT_RASTER_TYPE_KEY: u32 = 1025;
const GEOGRAPHIC_TYPE_KEY: u32 = 2048;
const PROJECTED_CS_TYPE_KEY: u32 = 3072;
const USER_DEFINED: u32 = 32767;

fn tag(code: u16) -> Tag {
    Tag::from_u16_exhaustive(code)
}

/// Options for writing GeoTIFF files
#[derive(Debug, Clone, Default)]
pub struct GeoTiffOptions {
    /// Storage type of the written cells
    pub data_type: DataType,
}

impl GeoTiffOptions {
    pub fn with_data_type(data_type: DataType) -> Self {
        Self { data_type }
    }
}

/// Read one band of a GeoTIFF file into a Raster
///
/// `band` is 1-indexed and defaults to 1.
pub fn read_geotiff<T, P>(path: P, band: Option<usize>) -> Result<Raster<T>>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    read_geotiff_with_type(path, band).map(|(raster, _)| raster)
}

/// Read one band of a GeoTIFF file, also reporting the stored cell type
pub fn read_geotiff_with_type<T, P>(path: P, band: Option<usize>) -> Result<(Raster<T>, DataType)>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = File::open(path.as_ref())?;
    decode_geotiff(file, band.unwrap_or(1))
}

fn decode_geotiff<T, R>(reader: R, band: usize) -> Result<(Raster<T>, DataType)>
where
    T: RasterElement,
    R: Read + Seek,
{
    let mut decoder = Decoder::new(reader)
        .map_err(|e| Error::Other(format!("TIFF decode error: {}", e)))?;

    let (width, height) = decoder
        .dimensions()
        .map_err(|e| Error::Other(format!("Cannot read dimensions: {}", e)))?;
    let rows = height as usize;
    let cols = width as usize;

    let samples = match decoder
        .colortype()
        .map_err(|e| Error::Other(format!("Cannot read color type: {}", e)))?
    {
        ColorType::Gray(_) => 1,
        ColorType::GrayA(_) => 2,
        ColorType::RGB(_) => 3,
        ColorType::RGBA(_) | ColorType::CMYK(_) => 4,
        other => {
            return Err(Error::UnsupportedDataType(format!(
                "TIFF color type {:?}",
                other
            )))
        }
    };
    if band == 0 || band > samples {
        return Err(Error::BandOutOfRange {
            band,
            available: samples,
        });
    }

    let result = decoder
        .read_image()
        .map_err(|e| Error::Other(format!("Cannot read image data: {}", e)))?;
    let (values, data_type) = decoded_values(result)?;

    let data: Vec<T> = values
        .into_iter()
        .skip(band - 1)
        .step_by(samples)
        .map(|v| num_traits::cast(v).unwrap_or(T::default_nodata()))
        .collect();

    let mut raster = Raster::from_vec(data, rows, cols)?;

    if let Some(transform) = read_geotransform(&mut decoder) {
        raster.set_transform(transform);
    }
    raster.set_crs(read_crs(&mut decoder));
    if let Some(nodata) = read_nodata(&mut decoder) {
        raster.set_nodata(num_traits::cast(nodata));
    }

    Ok((raster, data_type))
}

fn decoded_values(result: DecodingResult) -> Result<(Vec<f64>, DataType)> {
    fn widen<V: Copy + Into<f64>>(buf: Vec<V>) -> Vec<f64> {
        buf.into_iter().map(Into::into).collect()
    }

    Ok(match result {
        DecodingResult::U8(buf) => (widen(buf), DataType::UInt8),
        DecodingResult::U16(buf) => (widen(buf), DataType::UInt16),
        DecodingResult::I8(buf) => (widen(buf), DataType::Int16),
        DecodingResult::I16(buf) => (widen(buf), DataType::Int16),
        DecodingResult::I32(buf) => (widen(buf), DataType::Int32),
        DecodingResult::U32(buf) => (widen(buf), DataType::Float64),
        DecodingResult::F32(buf) => (widen(buf), DataType::Float32),
        DecodingResult::F64(buf) => (buf, DataType::Float64),
        _ => {
            return Err(Error::UnsupportedDataType(
                "64-bit integer TIFF samples".to_string(),
            ))
        }
    })
}

/// GeoTransform from ModelPixelScaleTag + ModelTiepointTag
fn read_geotransform<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<GeoTransform> {
    let scale = decoder.get_tag_f64_vec(tag(MODEL_PIXEL_SCALE)).ok()?;
    let tiepoint = decoder.get_tag_f64_vec(tag(MODEL_TIEPOINT)).ok()?;

    if scale.len() < 2 || tiepoint.len() < 6 {
        return None;
    }

    // tiepoint: [I, J, K, X, Y, Z], scale: [ScaleX, ScaleY, ScaleZ]
    let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
    let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
    Some(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]))
}

/// EPSG code from the projected or geographic GeoKey, if stored inline
fn read_crs<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<CRS> {
    let keys = decoder.get_tag_u32_vec(tag(GEO_KEY_DIRECTORY)).ok()?;
    let n_keys = *keys.get(3)? as usize;

    let lookup = |wanted: u32| {
        keys[4..]
            .chunks_exact(4)
            .take(n_keys)
            .find(|entry| entry[0] == wanted && entry[1] == 0)
            .map(|entry| entry[3])
            .filter(|&code| code != 0 && code != USER_DEFINED)
    };

    lookup(PROJECTED_CS_TYPE_KEY)
        .or_else(|| lookup(GEOGRAPHIC_TYPE_KEY))
        .map(CRS::from_epsg)
}

fn read_nodata<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<f64> {
    let text = decoder.get_tag_ascii_string(tag(GDAL_NODATA)).ok()?;
    text.trim_matches(char::from(0)).trim().parse().ok()
}

/// Write a Raster to a GeoTIFF file
///
/// Cells are stored as `options.data_type` (4-byte float by default). No-data
/// cells of integer outputs are written as the raster's no-data value, or the
/// type's conventional sentinel when the raster has none.
pub fn write_geotiff<T, P>(raster: &Raster<T>, path: P, options: Option<GeoTiffOptions>) -> Result<()>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let options = options.unwrap_or_default();
    let file = BufWriter::new(File::create(path.as_ref())?);
    encode_geotiff(raster, file, options.data_type)
}

fn integer_nodata(data_type: DataType) -> f64 {
    match data_type {
        DataType::UInt8 => u8::MAX as f64,
        DataType::UInt16 => u16::MAX as f64,
        DataType::Int16 => i16::MIN as f64,
        DataType::Int32 => i32::MIN as f64,
        DataType::Float32 | DataType::Float64 => f64::NAN,
    }
}

fn encode_geotiff<T, W>(raster: &Raster<T>, writer: W, data_type: DataType) -> Result<()>
where
    T: RasterElement,
    W: Write + Seek,
{
    let mut encoder = TiffEncoder::new(writer)
        .map_err(|e| Error::Other(format!("TIFF encoder error: {}", e)))?;

    let raster_nodata = raster.nodata().and_then(|nd| nd.to_f64());
    let nodata = match raster_nodata {
        Some(nd) if !nd.is_nan() => Some(data_type.quantize(nd)),
        _ if data_type.is_float() => raster_nodata,
        _ => Some(integer_nodata(data_type)),
    };

    let values: Vec<f64> = raster
        .data()
        .iter()
        .map(|&v| {
            if raster.is_nodata(v) {
                nodata.unwrap_or(f64::NAN)
            } else {
                data_type.quantize(v.to_f64().unwrap_or(f64::NAN))
            }
        })
        .collect();

    macro_rules! encode_as {
        ($color:ty, $inner:ty) => {{
            let data: Vec<$inner> = values.iter().map(|&v| v as $inner).collect();
            write_image::<$color, W, T>(&mut encoder, raster, nodata, &data)
        }};
    }

    match data_type {
        DataType::UInt8 => encode_as!(colortype::Gray8, u8),
        DataType::UInt16 => encode_as!(colortype::Gray16, u16),
        DataType::Int16 => encode_as!(colortype::GrayI16, i16),
        DataType::Int32 => encode_as!(colortype::GrayI32, i32),
        DataType::Float32 => encode_as!(colortype::Gray32Float, f32),
        DataType::Float64 => encode_as!(colortype::Gray64Float, f64),
    }
}

fn write_image<C, W, T>(
    encoder: &mut TiffEncoder<W>,
    raster: &Raster<T>,
    nodata: Option<f64>,
    data: &[C::Inner],
) -> Result<()>
where
    C: EncoderColorType,
    [C::Inner]: TiffValue,
    W: Write + Seek,
    T: RasterElement,
{
    let tag_error = |name: &str, e: tiff::TiffError| Error::Other(format!("Cannot write {} tag: {}", name, e));
    let (rows, cols) = raster.shape();

    let mut image = encoder
        .new_image::<C>(cols as u32, rows as u32)
        .map_err(|e| Error::Other(format!("Cannot create TIFF image: {}", e)))?;

    let gt = raster.transform();
    let scale = [gt.pixel_width, gt.pixel_height.abs(), 0.0];
    image
        .encoder()
        .write_tag(tag(MODEL_PIXEL_SCALE), &scale[..])
        .map_err(|e| tag_error("pixel scale", e))?;

    let tiepoint = [0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
    image
        .encoder()
        .write_tag(tag(MODEL_TIEPOINT), &tiepoint[..])
        .map_err(|e| tag_error("tiepoint", e))?;

    let geokeys = geo_key_directory(raster.crs());
    image
        .encoder()
        .write_tag(tag(GEO_KEY_DIRECTORY), geokeys.as_slice())
        .map_err(|e| tag_error("geokey", e))?;

    if let Some(nd) = nodata {
        let text = if nd.is_nan() { "nan".to_string() } else { nd.to_string() };
        image
            .encoder()
            .write_tag(tag(GDAL_NODATA), text.as_str())
            .map_err(|e| tag_error("nodata", e))?;
    }

    image
        .write_data(data)
        .map_err(|e| Error::Other(format!("Cannot write image data: {}", e)))?;

    Ok(())
}

/// Minimal GeoKey directory: model type, raster type (pixel is area) and the
/// EPSG code when one is known.
fn geo_key_directory(crs: Option<&CRS>) -> Vec<u16> {
    let epsg = crs.and_then(|c| c.epsg()).and_then(|code| u16::try_from(code).ok());
    let geographic = crs.is_some_and(|c| c.is_geographic());

    let mut keys: Vec<[u16; 4]> = vec![
        [GT_MODEL_TYPE_KEY as u16, 0, 1, if geographic { 2 } else { 1 }],
        [GT_RASTER_TYPE_KEY as u16, 0, 1, 1],
    ];
    if let Some(code) = epsg {
        let key = if geographic { GEOGRAPHIC_TYPE_KEY } else { PROJECTED_CS_TYPE_KEY };
        keys.push([key as u16, 0, 1, code]);
    }

    let mut directory = vec![1, 1, 0, keys.len() as u16];
    directory.extend(keys.into_iter().flatten());
    directory
}

/// Check that an output path has one of the accepted extensions
pub fn ensure_extension(path: &Path, accepted: &[&str], expected: &'static str) -> Result<()> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext {
        Some(ext) if accepted.contains(&ext.as_str()) => Ok(()),
        _ => Err(Error::UnsupportedFormat {
            path: path.display().to_string(),
            expected,
        }),
    }
}

/// Raster outputs must be GeoTIFF
pub fn ensure_raster_path(path: &Path) -> Result<()> {
    ensure_extension(path, &["tif", "tiff"], "a GeoTIFF path (.tif/.tiff)")
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use tempfile::NamedTempFile;

    fn sample_raster() -> Raster<f64> {
        let mut raster: Raster<f64> = Raster::new(12, 9);
        raster.set_transform(GeoTransform::north_up(440_000.0, 4_650_000.0, 2.0));
        raster.set_crs(Some(CRS::from_epsg(32630)));
        for r in 0..12 {
            for c in 0..9 {
                raster.set(r, c, 100.0 + r as f64 * 0.25 + c as f64).unwrap();
            }
        }
        raster
    }

    #[test]
    fn test_float32_roundtrip_keeps_georeferencing() {
        let raster = sample_raster();
        let tmp = NamedTempFile::with_suffix(".tif").unwrap();
        write_geotiff(&raster, tmp.path(), None).unwrap();

        let (loaded, data_type): (Raster<f64>, _) = read_geotiff_with_type(tmp.path(), None).unwrap();
        assert_eq!(data_type, DataType::Float32);
        assert_eq!(loaded.shape(), (12, 9));
        assert_relative_eq!(loaded.get(11, 8).unwrap(), raster.get(11, 8).unwrap(), epsilon = 1e-4);
        assert_eq!(loaded.transform(), raster.transform());
        assert_eq!(loaded.crs().and_then(|c| c.epsg()), Some(32630));
    }

    #[test]
    fn test_nodata_survives_integer_storage() {
        let mut raster = sample_raster();
        raster.set(0, 0, f64::NAN).unwrap();
        let tmp = NamedTempFile::with_suffix(".tif").unwrap();
        write_geotiff(&raster, tmp.path(), Some(GeoTiffOptions::with_data_type(DataType::Int16))).unwrap();

        let (loaded, data_type): (Raster<f64>, _) = read_geotiff_with_type(tmp.path(), None).unwrap();
        assert_eq!(data_type, DataType::Int16);
        assert_eq!(loaded.nodata(), Some(i16::MIN as f64));
        assert_eq!(loaded.valid_at(0, 0), None);
        assert_eq!(loaded.get(2, 3).unwrap(), 104.0);
    }

    #[test]
    fn test_band_out_of_range() {
        let tmp = NamedTempFile::with_suffix(".tif").unwrap();
        write_geotiff(&sample_raster(), tmp.path(), None).unwrap();

        let result = read_geotiff::<f64, _>(tmp.path(), Some(2));
        assert!(matches!(result, Err(Error::BandOutOfRange { band: 2, available: 1 })));
    }

    #[test]
    fn test_raster_path_extension() {
        assert!(ensure_raster_path(Path::new("out/slope.TIF")).is_ok());
        assert!(matches!(
            ensure_raster_path(Path::new("out/mosaic.sdat")),
            Err(Error::UnsupportedFormat { .. })
        ));
    }
}
