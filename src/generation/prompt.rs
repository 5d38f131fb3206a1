#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ArtStyle {
    /// Edits the photo without changing its look.
    NoStyle,
    #[default]
    Caricature,
    Cartoon,
    Anime,
    Pixar,
    Comic,
    Watercolor,
    OilPainting,
    PencilSketch,
    PopArt,
    PixelArt,
    Claymation,
}

impl ArtStyle {
    pub const ALL: [ArtStyle; 12] = [
        ArtStyle::NoStyle,
        ArtStyle::Caricature,
        ArtStyle::Cartoon,
        ArtStyle::Anime,
        ArtStyle::Pixar,
        ArtStyle::Comic,
        ArtStyle::Watercolor,
        ArtStyle::OilPainting,
        ArtStyle::PencilSketch,
        ArtStyle::PopArt,
        ArtStyle::PixelArt,
        ArtStyle::Claymation,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ArtStyle::NoStyle => "No style",
            ArtStyle::Caricature => "Caricature",
            ArtStyle::Cartoon => "Cartoon",
            ArtStyle::Anime => "Anime",
            ArtStyle::Pixar => "3D animation",
            ArtStyle::Comic => "Comic book",
            ArtStyle::Watercolor => "Watercolor",
            ArtStyle::OilPainting => "Oil painting",
            ArtStyle::PencilSketch => "Pencil sketch",
            ArtStyle::PopArt => "Pop art",
            ArtStyle::PixelArt => "Pixel art",
            ArtStyle::Claymation => "Claymation",
        }
    }

    pub fn prompt_fragment(self) -> &'static str {
        match self {
            ArtStyle::NoStyle => "",
            ArtStyle::Caricature => {
                "a humorous caricature with exaggerated facial features, bold outlines and vivid colors"
            }
            ArtStyle::Cartoon => "a clean cartoon with flat colors and smooth outlines",
            ArtStyle::Anime => "an anime illustration with cel shading and expressive eyes",
            ArtStyle::Pixar => "a 3D animated movie character with soft lighting and rounded shapes",
            ArtStyle::Comic => "a comic book panel with ink lines, halftone shading and strong contrast",
            ArtStyle::Watercolor => "a loose watercolor painting with soft washes and visible paper texture",
            ArtStyle::OilPainting => "a classical oil painting with rich brush strokes",
            ArtStyle::PencilSketch => "a detailed graphite pencil sketch with cross hatching",
            ArtStyle::PopArt => "a pop art print with bright saturated blocks of color",
            ArtStyle::PixelArt => "retro pixel art with a limited palette",
            ArtStyle::Claymation => "a claymation figure with sculpted clay texture",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Quality {
    #[default]
    Standard,
    High,
}

impl Quality {
    pub fn label(self) -> &'static str {
        match self {
            Quality::Standard => "Standard",
            Quality::High => "High",
        }
    }
}

/// Text instruction sent along with the image.
pub fn build_prompt(style: ArtStyle, quality: Quality, instructions: &str, has_references: bool) -> String {
    let mut prompt = match style {
        ArtStyle::NoStyle => String::from(
            "Edit this photo. Keep it photorealistic and preserve the composition, \
             framing and identity of every person.",
        ),
        style => format!(
            "Transform this photo into {}. Keep the composition and framing so the result \
             lines up with the original, and keep every person recognisable.",
            style.prompt_fragment()
        ),
    };
    if quality == Quality::High {
        prompt.push_str(" Render fine details at the highest possible quality.");
    }
    if has_references {
        prompt.push_str(
            " Use the additional reference images as guidance and blend their subjects \
             or elements naturally into the scene.",
        );
    }
    let instructions = instructions.trim();
    if !instructions.is_empty() {
        prompt.push_str(" Additional instructions: ");
        prompt.push_str(instructions);
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_style_asks_for_an_edit() {
        let prompt = build_prompt(ArtStyle::NoStyle, Quality::Standard, "", false);
        assert!(prompt.starts_with("Edit this photo"));
        assert!(!prompt.contains("reference"));
    }

    #[test]
    fn styled_prompt_carries_fragment_references_and_instructions() {
        let prompt = build_prompt(ArtStyle::Cartoon, Quality::High, "  add a hat ", true);
        assert!(prompt.contains(ArtStyle::Cartoon.prompt_fragment()));
        assert!(prompt.contains("reference images"));
        assert!(prompt.contains("highest possible quality"));
        assert!(prompt.ends_with("Additional instructions: add a hat"));
    }

    #[test]
    fn every_style_but_none_has_a_fragment() {
        for style in ArtStyle::ALL {
            assert_eq!(style == ArtStyle::NoStyle, style.prompt_fragment().is_empty());
        }
    }
}
