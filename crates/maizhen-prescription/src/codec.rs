//! 处方文本编解码
//!
//! 药物列表与旧版处方文本之间的转换。支持两种文本格式：
//! - 按行分隔：`山药 1g\n佩兰 1.5g`
//! - 空格分隔（旧版）：`山药1g 佩兰1.5g 炙甘草1g`

use maizhen_core::Medicine;
use regex::Regex;
use std::sync::OnceLock;

/// 行格式：药名 + 空白 + 数量 + 可选的g
fn line_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(.+?)\s+(\d+\.?\d*)g?$").expect("valid line pattern"))
}

/// 旧版格式：药名紧跟数量 + 可选的g
fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(.+?)(\d+\.?\d*)g?$").expect("valid token pattern"))
}

/// 药物列表转处方文本
///
/// 每行一味药，有剂量时为 `药名 剂量g`；药名为空的条目跳过。
pub fn medicines_to_text(medicines: &[Medicine]) -> String {
    medicines
        .iter()
        .filter_map(|m| {
            let name = m.name.trim();
            let dosage = m.dosage.trim();
            if name.is_empty() {
                None
            } else if dosage.is_empty() {
                Some(name.to_string())
            } else {
                Some(format!("{} {}g", name, dosage))
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// 单独的剂量token，如 `6g`
fn dosage_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(\d+\.?\d*)g?$").expect("valid dosage pattern"))
}

/// 处方文本转药物列表，每个条目分配新的ID
///
/// 旧版格式中单独出现的剂量token会并入前一个尚无剂量的条目，
/// 因此单味药的 `甘草 6g` 也能还原。
pub fn text_to_medicines(text: &str) -> Vec<Medicine> {
    if text.contains('\n') {
        return text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| parse_entry(line_pattern(), line))
            .collect();
    }

    let mut medicines: Vec<Medicine> = Vec::new();
    for token in text.split_whitespace() {
        if let Some(caps) = dosage_pattern().captures(token) {
            if let Some(last) = medicines.last_mut().filter(|m| m.dosage.is_empty()) {
                last.dosage = caps[1].to_string();
                continue;
            }
        }
        medicines.push(parse_entry(token_pattern(), token));
    }
    medicines
}

fn parse_entry(pattern: &Regex, entry: &str) -> Medicine {
    match pattern.captures(entry) {
        Some(caps) => Medicine::new(caps[1].trim(), &caps[2]),
        None => Medicine::new(entry, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(medicines: &[Medicine]) -> Vec<(String, String)> {
        medicines
            .iter()
            .map(|m| (m.name.clone(), m.dosage.clone()))
            .collect()
    }

    #[test]
    fn test_to_text_skips_empty_names() {
        let list = vec![Medicine::new("", "5"), Medicine::new("麻黄", "3")];
        assert_eq!(medicines_to_text(&list), "麻黄 3g");
    }

    #[test]
    fn test_to_text_without_dosage() {
        let list = vec![Medicine::new(" 生姜 ", " "), Medicine::new("大枣", "12")];
        assert_eq!(medicines_to_text(&list), "生姜\n大枣 12g");
        assert_eq!(medicines_to_text(&[]), "");
    }

    #[test]
    fn test_legacy_space_format() {
        let list = text_to_medicines("山药1g 佩兰1.5g");
        assert_eq!(
            pairs(&list),
            vec![
                ("山药".to_string(), "1".to_string()),
                ("佩兰".to_string(), "1.5".to_string())
            ]
        );
    }

    #[test]
    fn test_legacy_tokens_without_dosage() {
        let list = text_to_medicines("当归10g  川芎 炙甘草");
        assert_eq!(
            pairs(&list),
            vec![
                ("当归".to_string(), "10".to_string()),
                ("川芎".to_string(), String::new()),
                ("炙甘草".to_string(), String::new())
            ]
        );
    }

    #[test]
    fn test_line_format() {
        let list = text_to_medicines("山药 1g\n\n佩兰 1.5\r\n甘草\n");
        assert_eq!(
            pairs(&list),
            vec![
                ("山药".to_string(), "1".to_string()),
                ("佩兰".to_string(), "1.5".to_string()),
                ("甘草".to_string(), String::new())
            ]
        );
    }

    #[test]
    fn test_fresh_ids() {
        let list = text_to_medicines("山药1g 佩兰1.5g");
        assert_ne!(list[0].id, list[1].id);
        assert!(text_to_medicines("").is_empty());
        assert!(text_to_medicines("   ").is_empty());
    }

    #[test]
    fn test_round_trip_preserves_pairs() {
        let original = vec![
            Medicine::new("黄芪", "30"),
            Medicine::new("当归", "6"),
            Medicine::new("桂枝", "4.5"),
            Medicine::new("黄芪", "30"),
        ];
        let text = medicines_to_text(&original);
        let parsed = text_to_medicines(&text);

        let mut expected = pairs(&original);
        let mut actual = pairs(&parsed);
        expected.sort();
        actual.sort();
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_single_entry_round_trip() {
        // 单行文本走空格分隔分支
        let text = medicines_to_text(&[Medicine::new("甘草", "6")]);
        assert_eq!(text, "甘草 6g");
        let parsed = text_to_medicines(&text);
        assert_eq!(pairs(&parsed), vec![("甘草".to_string(), "6".to_string())]);
    }

    #[test]
    fn test_spaced_dosage_joins_previous_token() {
        // 紧贴格式与空格格式混用
        let parsed = text_to_medicines("山药1g 佩兰1.5g 甘草 6g 当归 10g");
        assert_eq!(
            pairs(&parsed),
            vec![
                ("山药".to_string(), "1".to_string()),
                ("佩兰".to_string(), "1.5".to_string()),
                ("甘草".to_string(), "6".to_string()),
                ("当归".to_string(), "10".to_string())
            ]
        );

        // 前一味已有剂量时不合并
        let parsed = text_to_medicines("山药1g 6g");
        assert_eq!(
            pairs(&parsed),
            vec![
                ("山药".to_string(), "1".to_string()),
                ("6g".to_string(), String::new())
            ]
        );
    }

    #[test]
    fn test_leading_bare_dosage_stays_a_token() {
        let parsed = text_to_medicines("6g 甘草3g");
        assert_eq!(
            pairs(&parsed),
            vec![
                ("6g".to_string(), String::new()),
                ("甘草".to_string(), "3".to_string())
            ]
        );
    }
}
