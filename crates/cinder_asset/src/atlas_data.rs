//! Texture atlas file parser
//!
//! Text format: blank-line separated pages. Each page starts with the image
//! file name followed by `key: value` page fields, then regions. A region is a
//! name line followed by its own `key: value` fields.
//!
//! ```text
//! ui.png
//! size: 256, 256
//! format: RGBA8888
//! filter: Linear, Linear
//! repeat: none
//! button
//!   rotate: false
//!   xy: 2, 2
//!   size: 64, 32
//!   orig: 64, 32
//!   offset: 0, 0
//!   index: -1
//! ```
//!
//! The newer `bounds:`/`offsets:` region fields are accepted too. Unknown keys
//! are ignored.

use crate::error::AssetError;
use crate::resolver;
use cinder_render::{PixelFormat, TextureFilter, TextureWrap};

#[derive(Debug, Clone, PartialEq)]
pub struct PageSpec {
    /// Image path, resolved relative to the atlas file.
    pub texture_path: String,
    pub width: u32,
    pub height: u32,
    pub format: Option<PixelFormat>,
    pub min_filter: TextureFilter,
    pub mag_filter: TextureFilter,
    pub wrap_u: TextureWrap,
    pub wrap_v: TextureWrap,
}

impl PageSpec {
    fn new(texture_path: String) -> Self {
        Self {
            texture_path,
            width: 0,
            height: 0,
            format: None,
            min_filter: TextureFilter::Nearest,
            mag_filter: TextureFilter::Nearest,
            wrap_u: TextureWrap::ClampToEdge,
            wrap_v: TextureWrap::ClampToEdge,
        }
    }

    pub fn use_mipmaps(&self) -> bool {
        self.min_filter.is_mipmap()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegionSpec {
    pub page: usize,
    pub name: String,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub rotate: bool,
    pub original_width: Option<u32>,
    pub original_height: Option<u32>,
    pub offset_x: f32,
    pub offset_y: f32,
    pub index: i32,
}

impl RegionSpec {
    fn new(page: usize, name: String) -> Self {
        Self {
            page,
            name,
            x: 0,
            y: 0,
            width: 0,
            height: 0,
            rotate: false,
            original_width: None,
            original_height: None,
            offset_x: 0.0,
            offset_y: 0.0,
            index: -1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AtlasData {
    pub pages: Vec<PageSpec>,
    pub regions: Vec<RegionSpec>,
}

struct Parser<'a> {
    path: &'a str,
    line: usize,
}

impl Parser<'_> {
    fn error(&self, message: impl Into<String>) -> AssetError {
        AssetError::parse(self.path, self.line, message)
    }

    fn ints<const N: usize>(&self, value: &str) -> Result<[i64; N], AssetError> {
        let mut out = [0i64; N];
        let mut parts = value.split(',').map(str::trim);
        for slot in out.iter_mut() {
            let part = parts
                .next()
                .ok_or_else(|| self.error(format!("expected {N} values, got '{value}'")))?;
            *slot = part
                .parse()
                .map_err(|_| self.error(format!("'{part}' is not an integer")))?;
        }
        Ok(out)
    }

    fn uints<const N: usize>(&self, value: &str) -> Result<[u32; N], AssetError> {
        let ints = self.ints::<N>(value)?;
        let mut out = [0u32; N];
        for (slot, v) in out.iter_mut().zip(ints) {
            *slot = u32::try_from(v).map_err(|_| self.error(format!("'{v}' is out of range")))?;
        }
        Ok(out)
    }

    fn page_field(&self, page: &mut PageSpec, key: &str, value: &str) -> Result<(), AssetError> {
        match key {
            "size" => [page.width, page.height] = self.uints(value)?,
            "format" => {
                page.format = Some(
                    PixelFormat::from_atlas_name(value)
                        .ok_or_else(|| self.error(format!("unknown format '{value}'")))?,
                );
            }
            "filter" => {
                let mut names = value.split(',');
                let mut next = || {
                    names
                        .next()
                        .and_then(TextureFilter::from_atlas_name)
                        .ok_or_else(|| self.error(format!("bad filter '{value}'")))
                };
                page.min_filter = next()?;
                page.mag_filter = next()?;
            }
            "repeat" => {
                let value = value.trim();
                let (u, v) = match value {
                    "x" => (TextureWrap::Repeat, TextureWrap::ClampToEdge),
                    "y" => (TextureWrap::ClampToEdge, TextureWrap::Repeat),
                    "xy" => (TextureWrap::Repeat, TextureWrap::Repeat),
                    "none" => (TextureWrap::ClampToEdge, TextureWrap::ClampToEdge),
                    _ => return Err(self.error(format!("bad repeat '{value}'"))),
                };
                page.wrap_u = u;
                page.wrap_v = v;
            }
            _ => {}
        }
        Ok(())
    }

    fn region_field(&self, region: &mut RegionSpec, key: &str, value: &str) -> Result<(), AssetError> {
        match key {
            "rotate" => {
                region.rotate = match value.trim() {
                    "true" | "90" => true,
                    "false" | "0" => false,
                    other => return Err(self.error(format!("bad rotate '{other}'"))),
                };
            }
            "xy" => [region.x, region.y] = self.uints(value)?,
            "size" => [region.width, region.height] = self.uints(value)?,
            "bounds" => [region.x, region.y, region.width, region.height] = self.uints(value)?,
            "orig" => {
                let [w, h] = self.uints(value)?;
                region.original_width = Some(w);
                region.original_height = Some(h);
            }
            "offset" => {
                let [x, y] = self.ints(value)?;
                region.offset_x = x as f32;
                region.offset_y = y as f32;
            }
            "offsets" => {
                let [x, y, w, h] = self.ints(value)?;
                region.offset_x = x as f32;
                region.offset_y = y as f32;
                region.original_width = Some(self.to_u32(w)?);
                region.original_height = Some(self.to_u32(h)?);
            }
            "index" => {
                let [index] = self.ints(value)?;
                region.index =
                    i32::try_from(index).map_err(|_| self.error("index out of range"))?;
            }
            _ => {}
        }
        Ok(())
    }

    fn to_u32(&self, v: i64) -> Result<u32, AssetError> {
        u32::try_from(v).map_err(|_| self.error(format!("'{v}' is out of range")))
    }
}

/// Parse atlas text. Page image paths are resolved against the atlas directory.
pub fn parse(atlas_path: &str, text: &str) -> Result<AtlasData, AssetError> {
    let dir = resolver::parent(atlas_path);
    let mut parser = Parser {
        path: atlas_path,
        line: 0,
    };
    let mut data = AtlasData::default();
    let mut page: Option<usize> = None;
    let mut region: Option<RegionSpec> = None;

    for (number, raw) in text.lines().enumerate() {
        parser.line = number + 1;
        let line = raw.trim();

        if line.is_empty() {
            data.regions.extend(region.take());
            page = None;
            continue;
        }

        let Some(page_index) = page else {
            data.pages.push(PageSpec::new(resolver::join(dir, line)));
            page = Some(data.pages.len() - 1);
            continue;
        };

        match line.split_once(':') {
            Some((key, value)) => {
                let key = key.trim();
                match region.as_mut() {
                    Some(region) => parser.region_field(region, key, value)?,
                    None => parser.page_field(&mut data.pages[page_index], key, value)?,
                }
            }
            None => {
                data.regions.extend(region.take());
                region = Some(RegionSpec::new(page_index, line.to_string()));
            }
        }
    }
    data.regions.extend(region.take());

    for region in &mut data.regions {
        region.original_width.get_or_insert(region.width);
        region.original_height.get_or_insert(region.height);
    }

    tracing::trace!(
        path = atlas_path,
        pages = data.pages.len(),
        regions = data.regions.len(),
        "atlas parsed"
    );
    Ok(data)
}
