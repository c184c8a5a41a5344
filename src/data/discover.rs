use crate::config::LoopSpec;

/// Prefix that marks a setpoint column; the PV column is the remainder.
const SP_PREFIX: &str = "SP_";

/// Human-readable names for the tags found in the CSTR exports.
fn tag_description(tag: &str) -> Option<&'static str> {
    let d = match tag {
        "TT_101" => "Temperature Tank 1",
        "TT_102" => "Temperature Tank 2",
        "LT_101" => "Level Tank 1",
        "LT_102" => "Level Tank 2",
        "FT_101" => "Flow Tank 1",
        "FT_102" => "Flow Tank 2",
        "ST_101" => "Stirring Tank 1",
        "ST_102" => "Stirring Tank 2",
        "AT_101" => "Analyzer/Composition",
        "CT_104" => "Controller Output 104",
        "CT_105" => "Controller Output 105",
        "CT_106" => "Controller Output 106",
        _ => return None,
    };
    Some(d)
}

/// Find every `SP_<tag>` column that has a matching `<tag>` column.
///
/// Loops come back in the header order of their setpoint columns.
pub fn discover_loops(columns: &[String]) -> Vec<LoopSpec> {
    columns
        .iter()
        .filter_map(|sp| {
            let tag = sp.strip_prefix(SP_PREFIX)?;
            if tag.is_empty() || !columns.iter().any(|c| c == tag) {
                return None;
            }
            Some(LoopSpec {
                pv_column: tag.to_string(),
                sp_column: sp.clone(),
                label: tag_description(tag).unwrap_or(tag).to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn pairs_follow_setpoint_order() {
        let loops = discover_loops(&cols(&[
            "timestamp",
            "LT_101",
            "SP_TT_101",
            "TT_101",
            "SP_LT_101",
            "conversion",
        ]));
        assert_eq!(loops.len(), 2);
        assert_eq!(loops[0].pv_column, "TT_101");
        assert_eq!(loops[0].sp_column, "SP_TT_101");
        assert_eq!(loops[0].label, "Temperature Tank 1");
        assert_eq!(loops[1].label, "Level Tank 1");
    }

    #[test]
    fn unmatched_setpoints_are_skipped() {
        let loops = discover_loops(&cols(&["SP_FT_101", "SP_", "XX_9", "SP_XX_9"]));
        assert_eq!(loops.len(), 1);
        assert_eq!(loops[0].label, "XX_9");
    }
}
