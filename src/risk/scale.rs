use serde::Serialize;

use crate::models::PointLevel;

/// Presentation data for one level of the monofilament scale.
///
/// Report generation depends on `description` and `force_label` verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaleEntry {
    pub level: u8,
    pub filament: &'static str,
    pub description: &'static str,
    pub force_label: &'static str,
    /// `#RRGGBB`
    pub color: &'static str,
}

impl ScaleEntry {
    /// Single-line label used in reports, e.g. `Verde (0,05g) - Normal`.
    pub fn report_label(&self) -> String {
        if self.level == 0 {
            return self.description.to_string();
        }
        format!("{} ({}) - {}", self.filament, self.force_label, self.description)
    }
}

static CLINICAL_SCALE: [ScaleEntry; 7] = [
    ScaleEntry {
        level: 0,
        filament: "",
        description: "Aguardando medição",
        force_label: "Aguardando...",
        color: "#00ACC1",
    },
    ScaleEntry {
        level: 1,
        filament: "Verde",
        description: "Normal",
        force_label: "0,05g",
        color: "#2E7D32",
    },
    ScaleEntry {
        level: 2,
        filament: "Azul",
        description: "Diminuída",
        force_label: "0,2g",
        color: "#1565C0",
    },
    ScaleEntry {
        level: 3,
        filament: "Violeta",
        description: "Perda Protetora",
        force_label: "2,0g",
        color: "#7B1FA2",
    },
    ScaleEntry {
        level: 4,
        filament: "Vermelho",
        description: "Perda Severa",
        force_label: "4,0g",
        color: "#D32F2F",
    },
    ScaleEntry {
        level: 5,
        filament: "Laranja",
        description: "Perda Profunda",
        force_label: "10,0g",
        color: "#EF6C00",
    },
    ScaleEntry {
        level: 6,
        filament: "Magenta",
        description: "Perda Total",
        force_label: "300g",
        color: "#C2185B",
    },
];

/// Total over the closed scale; level 0 is the "awaiting measurement" placeholder.
pub fn describe_level(level: PointLevel) -> &'static ScaleEntry {
    &CLINICAL_SCALE[usize::from(level.value())]
}

pub fn clinical_scale() -> &'static [ScaleEntry] {
    &CLINICAL_SCALE
}
