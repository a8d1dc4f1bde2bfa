//! Which filing sections to extract, and how their text is cleaned.

use lazy_static::lazy_static;
use regex::Regex;

/// Extracted sections at or below this many characters are dropped.
pub const MIN_SECTION_CHARS: usize = 50;

pub const TEN_K_SECTIONS: &[(&str, &str)] = &[
    ("1", "Item_1_Business"),
    ("1A", "Item_1A_Risk_Factors"),
    ("1B", "Item_1B_Unresolved_Staff_Comments"),
    ("2", "Item_2_Properties"),
    ("3", "Item_3_Legal_Proceedings"),
    ("7", "Item_7_MDandA"),
    ("7A", "Item_7A_Market_Risk"),
    ("8", "Item_8_Financial_Statements"),
];

pub const TEN_Q_SECTIONS: &[(&str, &str)] = &[
    ("part1item1", "P1_Item_1_Financial_Statements"),
    ("part1item2", "P1_Item_2_MDandA"),
    ("part1item3", "P1_Item_3_Market_Risk"),
    ("part1item4", "P1_Item_4_Controls_and_Procedures"),
    ("part2item1", "P2_Item_1_Legal_Proceedings"),
    ("part2item1a", "P2_Item_1A_Risk_Factors"),
];

/// 8-K items as reported in filing metadata (`"2.02"`).
pub const EIGHT_K_SECTIONS: &[(&str, &str)] = &[
    ("1.01", "Item_1_01_Material_Agreement"),
    ("2.01", "Item_2_01_Acquisition_or_Disposition"),
    ("2.02", "Item_2_02_Results_of_Operations"),
    ("5.02", "Item_5_02_Departure_of_Directors_Officers"),
    ("7.01", "Item_7_01_Reg_FD_Disclosure"),
    ("8.01", "Item_8_01_Other_Events"),
];

/// A section to request from the extractor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionRequest {
    /// Item code the extractor API understands.
    pub api_code: String,
    /// Stable id written to the output records.
    pub section_id: &'static str,
}

/// Extractor item code for an 8-K item number: `"1.01"` → `"1-1"`.
pub fn eight_k_api_code(item: &str) -> String {
    match item.split_once('.') {
        Some((major, minor)) => {
            let minor = minor.trim_start_matches('0');
            let minor = if minor.is_empty() { "0" } else { minor };
            format!("{major}-{minor}")
        }
        None => item.to_string(),
    }
}

/// Item number from a reported item such as `"Item 2.02: Results of Operations"`.
fn reported_item_code(item: &str) -> &str {
    let item = item.trim();
    let item = item.strip_prefix("Item ").unwrap_or(item);
    item.split(':').next().unwrap_or(item).trim()
}

/// Sections to extract for a filing. 10-K and 10-Q (and their amendments)
/// use the fixed maps; an 8-K only asks for the mapped items it reports.
pub fn sections_for_filing(form_type: &str, reported_items: &[String]) -> Vec<SectionRequest> {
    let form = form_type.to_uppercase();
    let fixed = |map: &[(&str, &'static str)]| {
        map.iter()
            .map(|&(code, id)| SectionRequest {
                api_code: code.to_string(),
                section_id: id,
            })
            .collect()
    };

    if form.contains("10-K") {
        fixed(TEN_K_SECTIONS)
    } else if form.contains("10-Q") {
        fixed(TEN_Q_SECTIONS)
    } else if form.contains("8-K") {
        let mut out: Vec<SectionRequest> = Vec::new();
        for item in reported_items {
            let code = reported_item_code(item);
            if let Some(&(_, id)) = EIGHT_K_SECTIONS.iter().find(|(c, _)| *c == code) {
                if !out.iter().any(|s| s.section_id == id) {
                    out.push(SectionRequest {
                        api_code: eight_k_api_code(code),
                        section_id: id,
                    });
                }
            }
        }
        out
    } else {
        Vec::new()
    }
}

lazy_static! {
    static ref HORIZONTAL_WS: Regex = Regex::new(r"[ \t]+").unwrap();
    static ref EXCESS_NEWLINES: Regex = Regex::new(r"(\n\s*){3,}").unwrap();
}

/// Collapse runs of spaces/tabs and cap blank lines at one paragraph break.
pub fn normalize_text(raw: &str) -> String {
    let text = HORIZONTAL_WS.replace_all(raw.trim(), " ");
    let text = EXCESS_NEWLINES.replace_all(&text, "\n\n");
    text.trim().to_string()
}

/// Cleaned text if the section is long enough to keep.
pub fn clean_section(raw: &str) -> Option<String> {
    if raw.trim().chars().count() > MIN_SECTION_CHARS {
        Some(normalize_text(raw))
    } else {
        None
    }
}
