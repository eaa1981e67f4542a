use crate::models::job::{CustomizationMap, CustomizationValue};
use crate::models::product::{CustomizationZone, Product, ZoneType};

/// Baseline defect terms excluded from every generation, appended after any
/// product-configured negative prompt.
const BASELINE_NEGATIVE: &str = "blurry, distorted, deformed, low quality, pixelated, \
     watermark, text artifacts, bad anatomy, disfigured, oversaturated, cropped";

const STYLE_DIRECTIVE: &str =
    "photorealistic, professional product photography, high quality, detailed";

/// Build the final prompt and negative prompt for a generation request.
///
/// Pure and deterministic: retries of the same job must reproduce byte-identical
/// prompts, so no randomness, clocks, or I/O here. Zone placeholders in the
/// product template use the zone id in braces, e.g. `{engraving_text}`.
pub fn build_prompt(
    product: &Product,
    customizations: &CustomizationMap,
    user_hint: Option<&str>,
) -> (String, String) {
    let mut prompt = product
        .prompt_template
        .clone()
        .unwrap_or_else(|| format!("A high-quality product photo of {}", product.name));

    for zone in &product.zones {
        let clause = customizations
            .get(&zone.id)
            .filter(|value| !value.is_empty())
            .map(|value| zone_clause(zone, value))
            .unwrap_or_default();

        let placeholder = format!("{{{}}}", zone.id);
        if prompt.contains(&placeholder) {
            prompt = prompt.replace(&placeholder, &clause);
        } else if !clause.is_empty() {
            // Templates without a placeholder for a customized zone still get
            // the clause; dropping a paid customization silently is worse than
            // an appended clause.
            prompt.push(' ');
            prompt.push_str(&clause);
        }
    }

    // Any placeholder left over (unknown zone id, typo in the template) must not
    // leak into the provider prompt.
    let mut prompt = strip_placeholders(&prompt);

    prompt.push_str(&format!(", {} product, {}", product.category, STYLE_DIRECTIVE));

    if let Some(hint) = user_hint.map(str::trim).filter(|h| !h.is_empty()) {
        prompt.push_str(&format!(", additional customization: {hint}"));
    }

    let prompt = collapse_whitespace(&prompt);

    let negative = match product.negative_prompt.as_deref().map(str::trim) {
        Some(configured) if !configured.is_empty() => {
            format!("{configured}, {BASELINE_NEGATIVE}")
        }
        _ => BASELINE_NEGATIVE.to_string(),
    };

    (prompt, negative)
}

/// Natural-language clause for one customized zone.
fn zone_clause(zone: &CustomizationZone, value: &CustomizationValue) -> String {
    match zone.zone_type {
        ZoneType::Text => {
            let text = value.text.as_deref().unwrap_or_default();
            let mut clause = format!(
                "with the text \"{}\" {}",
                text,
                zone.render_style.prompt_verb()
            );
            if let Some(font) = value.font.as_deref().filter(|f| !f.is_empty()) {
                clause.push_str(&format!(" in {font} font"));
            }
            if let Some(color) = value.color.as_deref().filter(|c| !c.is_empty()) {
                clause.push_str(&format!(" with {color} color"));
            }
            clause
        }
        ZoneType::Color => {
            let color = value.color.as_deref().unwrap_or_default();
            format!("with {color} color")
        }
        ZoneType::Pattern => {
            let pattern = value.pattern.as_deref().unwrap_or_default();
            format!("with a {pattern} pattern")
        }
    }
}

/// Remove `{...}` placeholder tokens that survived substitution.
fn strip_placeholders(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.char_indices();
    while let Some((i, c)) = chars.next() {
        if c == '{' {
            if let Some(end) = input[i..].find('}') {
                // Skip the whole token, including the closing brace.
                for _ in 0..input[i..i + end].chars().count() {
                    chars.next();
                }
                continue;
            }
        }
        out.push(c);
    }
    out
}

/// Collapse runs of whitespace (including newlines from multi-line templates)
/// into single spaces.
fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}
