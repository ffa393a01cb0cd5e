//! CAPTCHA template library.
//!
//! The library file maps a task description to a list of category-labelled
//! JPEG files. On load every image is decoded, noised and re-encoded at a
//! low quality so repeated loads never serve byte-identical images.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::ImageReader;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;

use super::noise::add_uniform_noise;

/// Per-channel noise amplitude applied to library images
const NOISE_INTENSITY: i32 = 20;

/// JPEG quality of the re-encoded images
const JPEG_QUALITY: u8 = 50;

#[derive(Debug, Deserialize)]
struct LibraryFile {
    templates: Vec<TemplateEntry>,
}

#[derive(Debug, Deserialize)]
struct TemplateEntry {
    #[serde(default)]
    description: String,
    images: Vec<String>,
}

/// One image category: its task description and how many image slots it
/// provides.
#[derive(Debug, Clone)]
pub struct Template {
    pub description: String,
    pub slots: usize,
}

/// An immutable snapshot of the loaded template set. The manager swaps whole
/// snapshots on reload, so tasks built from an old snapshot stay coherent.
pub struct TemplateLibrary {
    templates: Vec<Template>,
    /// base64 JPEG keyed by (template index, slot index)
    images: HashMap<(usize, usize), String>,
}

impl TemplateLibrary {
    /// Read the library file and prepare every image.
    ///
    /// Any read or decode failure aborts the whole load; the caller decides
    /// whether that is fatal (startup) or ignorable (periodic reload).
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("unable to read template library {}", path.display()))?;
        let file: LibraryFile =
            serde_json::from_str(&content).context("unable to parse template library")?;

        let mut templates = Vec::with_capacity(file.templates.len());
        let mut images = HashMap::new();
        for (template_idx, entry) in file.templates.iter().enumerate() {
            for (slot_idx, image_file) in entry.images.iter().enumerate() {
                let encoded = prepare_image(Path::new(image_file))
                    .with_context(|| format!("unable to prepare image {}", image_file))?;
                images.insert((template_idx, slot_idx), encoded);
            }
            templates.push(Template {
                description: entry.description.clone(),
                slots: entry.images.len(),
            });
        }

        Ok(Self { templates, images })
    }

    /// Build a library from already-prepared parts. Used by tests.
    pub fn from_parts(templates: Vec<Template>, images: HashMap<(usize, usize), String>) -> Self {
        Self { templates, images }
    }

    /// Number of templates
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn description(&self, template: usize) -> &str {
        self.templates
            .get(template)
            .map(|t| t.description.as_str())
            .unwrap_or("")
    }

    pub fn image(&self, template: usize, slot: usize) -> Option<&String> {
        self.images.get(&(template, slot))
    }
}

/// Decode a JPEG file, noise it and re-encode it as base64 JPEG.
fn prepare_image(path: &Path) -> Result<String> {
    let content = std::fs::read(path)?;
    let decoded = ImageReader::new(Cursor::new(content))
        .with_guessed_format()?
        .decode()?;
    let noised = add_uniform_noise(&decoded, NOISE_INTENSITY);

    let mut buffer = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buffer, JPEG_QUALITY);
    noised.write_with_encoder(encoder)?;
    Ok(STANDARD.encode(&buffer))
}
