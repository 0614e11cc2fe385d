// prompts.rs

/// How much of the article the title prompt gets to see.
pub const TITLE_CONTEXT_CHARS: usize = 500;

pub fn japanese_title_prompt(original_title: &str, article_text: &str) -> String {
    let excerpt = crate::feed::truncate_chars(article_text, TITLE_CONTEXT_CHARS);
    format!(
        "次の記事の英語タイトルを、本文の内容を踏まえて自然な日本語のタイトルにしてください。
短く要点が伝わるタイトルにしてください（目安は20文字程度）。
タイトルだけを出力し、説明や引用符は付けないでください。

英語タイトル: {}

本文:
{}

日本語タイトル:",
        original_title, excerpt
    )
}

pub fn japanese_summary_prompt(title: &str, article_text: &str) -> String {
    format!(
        "次の記事の内容を日本語で2〜3文に要約してください。
重要な事実（誰が、何を、影響範囲）を優先し、前置きや説明は書かないでください。

タイトル: {}

本文:
{}

要約:",
        title, article_text
    )
}
