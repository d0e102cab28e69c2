use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Orientation {
    /// The natively acquired plane. Only used by the 2-D overlay path.
    Axial,
    Coronal,
    #[default]
    Sagittal,
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Orientation::Axial => "axial",
            Orientation::Coronal => "coronal",
            Orientation::Sagittal => "sagittal",
        };
        f.write_str(name)
    }
}

impl FromStr for Orientation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "axial" => Ok(Orientation::Axial),
            "coronal" => Ok(Orientation::Coronal),
            "sagittal" => Ok(Orientation::Sagittal),
            other => Err(format!("unknown orientation `{other}`")),
        }
    }
}

/// Semantic class of a segmentation label.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LabelClass {
    Liver,
    Tumor,
    Other,
}

impl LabelClass {
    pub const ALL: [LabelClass; 3] = [LabelClass::Liver, LabelClass::Tumor, LabelClass::Other];

    pub const LIVER_LABELS: [u16; 2] = [1, 3];
    pub const TUMOR_LABELS: [u16; 1] = [2];

    /// Classify a non-zero label value.
    ///
    /// Background (`0`) has no class; callers skip it before asking.
    pub fn of_label(label: u16) -> Self {
        if Self::LIVER_LABELS.contains(&label) {
            LabelClass::Liver
        } else if Self::TUMOR_LABELS.contains(&label) {
            LabelClass::Tumor
        } else {
            LabelClass::Other
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            LabelClass::Liver => "liver",
            LabelClass::Tumor => "tumor",
            LabelClass::Other => "other",
        }
    }
}

impl fmt::Display for LabelClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LabelClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LabelClass::ALL
            .into_iter()
            .find(|class| class.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown label class `{s}`"))
    }
}

/// How a label color is weighted against the grayscale base.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BlendPolicy {
    /// Fixed compositing weight in `[0, 1]`, used by the MPR panel.
    Flat(f32),
    /// Weight taken from the alpha channel of the resolved color,
    /// used by the native-plane overlay.
    PerColorAlpha,
}

impl Default for BlendPolicy {
    fn default() -> Self {
        BlendPolicy::Flat(0.5)
    }
}
