use crate::{quota::normalize_student, storage::Settings};

#[derive(Debug, Clone, PartialEq)]
pub struct RosterRow {
    pub name: String,
    pub class: String,
}

#[derive(Debug, Default)]
pub struct ParsedRoster {
    pub rows: Vec<RosterRow>,
    /// 1-based line number and reason.
    pub rejected: Vec<(usize, String)>,
}

/// Parse `Name,Surname,Class` lines. `;` is accepted as separator since
/// spreadsheet exports in French locales use it. A header line is skipped.
pub fn parse_roster(text: &str, settings: &Settings) -> ParsedRoster {
    let mut parsed = ParsedRoster::default();

    for (idx, line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = line.trim().trim_start_matches('\u{feff}');
        if line.is_empty() {
            continue;
        }

        let separator = if line.contains(';') { ';' } else { ',' };
        let fields: Vec<&str> = line.split(separator).map(str::trim).collect();

        if idx == 0 && is_header(&fields) {
            continue;
        }

        let (name, surname, class) = match fields.as_slice() {
            [name, surname, class, ..] => (*name, *surname, *class),
            _ => {
                parsed.rejected.push((line_no, format!("expected 3 fields, got {}", fields.len())));
                continue;
            }
        };

        if name.is_empty() {
            parsed.rejected.push((line_no, "missing name".to_string()));
            continue;
        }

        let class = class.to_uppercase();
        if !settings.is_valid_class(&class) {
            parsed.rejected.push((line_no, format!("unknown class '{}'", class)));
            continue;
        }

        let full_name = normalize_student(&format!("{} {}", name, surname));

        parsed.rows.push(RosterRow { name: full_name, class });
    }

    parsed
}

fn is_header(fields: &[&str]) -> bool {
    fields.first().map_or(false, |first| {
        let first = first.to_lowercase();
        first == "name" || first == "nom"
    })
}
