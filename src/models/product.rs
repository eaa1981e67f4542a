use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What kind of input a customization zone accepts.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ZoneType {
    Text,
    Color,
    Pattern,
}

/// How a zone's customization is rendered onto the product surface.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RenderStyle {
    Flat,
    Engraved,
    Embossed,
}

impl RenderStyle {
    /// Natural-language rendering verb used in prompt clauses.
    pub fn prompt_verb(self) -> &'static str {
        match self {
            RenderStyle::Flat => "printed",
            RenderStyle::Engraved => "elegantly engraved",
            RenderStyle::Embossed => "embossed",
        }
    }
}

/// A named region/attribute of a product that can be personalized.
///
/// Owned by the product catalog; this subsystem only reads it. The `id` is a
/// stable slug referenced by `{id}` placeholders in the product's prompt
/// template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomizationZone {
    pub id: String,
    pub name: String,
    pub zone_type: ZoneType,
    pub required: bool,
    pub max_length: Option<u32>,
    pub render_style: RenderStyle,
    /// Position and size on the base product image, in pixels.
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// AR presentation config for a product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArConfig {
    pub enabled: bool,
    pub model_3d_url: Option<String>,
    pub tracking_type: String,
    pub scale: f64,
    pub offset: [f64; 3],
}

/// A customizable product, as read from the catalog collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub brand_id: Uuid,
    pub name: String,
    pub category: String,
    pub active: bool,

    pub prompt_template: Option<String>,
    pub negative_prompt: Option<String>,

    pub ai_provider: String,
    pub ai_model: String,
    pub quality: String,
    pub output_format: String,
    pub width: u32,
    pub height: u32,

    pub base_image_url: Option<String>,
    pub ar: ArConfig,

    pub zones: Vec<CustomizationZone>,
}
