//! Instruction template sent to the vision model alongside the uploaded image.

use crate::error::{RemixError, Result};
use handlebars::Handlebars;

const PLACEHOLDER: &str = "{{user_input}}";

pub const PROMPT_TEMPLATE: &str = "
まず、以下のユーザーのリクエストとアップロードされた画像を注意深く読んでください。
次に、アップロードされた画像に基づいて画像を生成するというユーザーのリクエストに
沿った DALL-E プロンプトを作成してください。
DALL-E プロンプトは必ず英語で作成してください。

ユーザー入力: {{user_input}}

プロンプトでは、ユーザーがアップロードした写真に何が描かれているか、どのように構成
されているかを詳細に説明してください。
写真に何が写っているのかはっきりと見える場合は、示されている場所や人物の名前を正確に
書き留めてください。
写真の構図とズームの程度を可能な限り詳しく説明してください。
写真の内容を可能な限り正確に再現することが重要です。

DALL-E 3 向けのプロンプトを英語で回答してください。
";

/// Substitutes the user's instruction into the template. The instruction is inserted verbatim:
/// nothing is escaped and handlebars expressions inside it are not expanded.
pub fn render(user_input: &str) -> Result<String> {
    let mut handlebars = Handlebars::new();
    handlebars.register_escape_fn(handlebars::no_escape);

    handlebars
        .render_template(PROMPT_TEMPLATE, &serde_json::json!({ "user_input": user_input }))
        .map_err(|e| RemixError::Template(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_lines() -> Vec<&'static str> {
        PROMPT_TEMPLATE
            .lines()
            .filter(|line| !line.is_empty() && !line.contains(PLACEHOLDER))
            .collect()
    }

    #[test]
    fn test_template_has_one_placeholder() {
        assert_eq!(PROMPT_TEMPLATE.matches(PLACEHOLDER).count(), 1);
    }

    #[test]
    fn test_render_contains_instruction_and_fixed_text() {
        let inputs = [
            "夕焼けの空にしてください",
            "Make it look like a watercolor painting",
            "braces {like} {{user_input}} this",
            "<b>quotes</b> & \"ampersands\"",
            "multi\nline\ninstruction",
        ];

        for input in inputs {
            let rendered = render(input).unwrap();
            assert!(rendered.contains(input), "missing instruction: {input}");
            for line in fixed_lines() {
                assert!(rendered.contains(line), "missing template line: {line}");
            }
            assert!(rendered.contains(&format!("ユーザー入力: {}", input)));
        }
    }

    #[test]
    fn test_render_does_not_expand_placeholder_in_input() {
        let rendered = render(PLACEHOLDER).unwrap();
        assert_eq!(rendered.matches(PLACEHOLDER).count(), 1);
        assert_eq!(rendered.len(), PROMPT_TEMPLATE.len());
    }
}
