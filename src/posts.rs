//! Promotional post text: prompt building, cleanup, and stream merging.
//!
//! Posts are stored one per line, so line breaks inside a post are kept as
//! the two-character escape `\n` rather than real newlines.

use std::sync::LazyLock;

use regex::Regex;

use crate::HermodError;
use crate::batch::BatchGenerator;

/// Escaped line break used inside stored posts.
pub const LINE_BREAK: &str = "\\n";

static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://[\w/:%#$&?()~.=+\-]+").expect("valid regex"));

static LEADING_LABEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^【.*?】").expect("valid regex"));

static LEADING_EXAMPLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^例[1-9]?：").expect("valid regex"));

static TRAILING_NOISE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:上記例を参考にして|他に\d+パターン).*").expect("valid regex"));

static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[.*?\]|【.*?】|〇{2,}|○{2,}|◯{2,}|X{2,}|x{2,}|△{2,}|Δ{2,}|×{2,}")
        .expect("valid regex")
});

static JAPANESE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ぁ-んァ-ン一-龥]").expect("valid regex"));

static HASHTAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([^\\n])#").expect("valid regex"));

/// Words that only appear when the model echoes a template.
const TEMPLATE_WORDS: &[&str] = &[
    "ブランド名",
    "商品名",
    "店舗名",
    "会社名",
    "カテゴリー",
    "〇〇",
    "○○",
];

/// Prefix callers put in front of rejected posts when writing them out.
pub const ERROR_MARKER: &str = "[AIエラー]";

/// Product details used to build an affiliate prompt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AffiliateProduct {
    pub name: String,
    pub short_url: String,
    /// Price as displayed, without currency.
    pub price: Option<String>,
    pub review_average: Option<f64>,
    pub review_count: Option<u32>,
    pub point_rate: Option<u32>,
}

impl AffiliateProduct {
    /// Parse one tab-separated product line:
    ///
    /// ```text
    /// name<TAB>short_url[<TAB>price[<TAB>review_average[<TAB>review_count[<TAB>point_rate]]]]
    /// ```
    ///
    /// Empty optional fields are `None`.
    pub fn from_tsv_line(line: &str) -> crate::Result<Self> {
        let mut fields = line.trim_end_matches(['\r', '\n']).split('\t').map(str::trim);
        let name = fields.next().unwrap_or_default();
        let short_url = fields.next().unwrap_or_default();
        if name.is_empty() || short_url.is_empty() {
            return Err(HermodError::InvalidInput(format!(
                "product line needs a name and a short url: {line:?}"
            )));
        }

        let price = fields.next().filter(|f| !f.is_empty()).map(str::to_string);
        let review_average = parse_field(fields.next(), "review_average", line)?;
        let review_count = parse_field(fields.next(), "review_count", line)?;
        let point_rate = parse_field(fields.next(), "point_rate", line)?;

        Ok(Self {
            name: name.to_string(),
            short_url: short_url.to_string(),
            price,
            review_average,
            review_count,
            point_rate,
        })
    }
}

fn parse_field<T: std::str::FromStr>(
    field: Option<&str>,
    name: &str,
    line: &str,
) -> crate::Result<Option<T>> {
    match field.filter(|f| !f.is_empty()) {
        None => Ok(None),
        Some(value) => value.parse().map(Some).map_err(|_| {
            HermodError::InvalidInput(format!("invalid {name} {value:?} in product line {line:?}"))
        }),
    }
}

/// Why a completion was not accepted as a post.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PostRejection {
    #[error("completion was empty")]
    Empty,
    #[error("placeholder or template word in completion")]
    Placeholder,
    #[error("no Japanese text in completion")]
    NotJapanese,
}

/// Build the generation prompt for a product post.
///
/// The product name is cut to `max_name_chars` characters. Price, rating
/// and point details are included only when they add something.
pub fn affiliate_prompt(product: &AffiliateProduct, max_name_chars: usize) -> String {
    let name: String = product.name.chars().take(max_name_chars).collect();

    let mut details = Vec::new();
    if let Some(price) = product.price.as_deref().filter(|p| !p.is_empty()) {
        details.push(format!("価格: {price}円"));
    }
    if let Some(avg) = product.review_average.filter(|avg| *avg > 0.0) {
        let count = product.review_count.unwrap_or(0);
        details.push(format!("評価: ★{avg}（{count}件）"));
    }
    if let Some(rate) = product.point_rate.filter(|rate| *rate > 1) {
        details.push(format!("ポイント: {rate}倍"));
    }

    format!(
        "以下の情報から、X（旧Twitter）向けの思わずクリックしたくなる投稿文を作成してください。\n\
         文章の中にURLやプレースホルダは含めず、改行が必要な箇所には \\n を入れてください。\n\
         \n\
         【商品名】\n{name}\n\
         \n\
         【補足情報】\n{details}\n\
         \n\
         条件：\n\
         ・本文は50文字以内\n\
         ・価格、高評価、ポイント還元などのお得感を1つ以上盛り込む\n\
         ・宣伝臭を抑え、利用者のメリットを強調\n\
         ・絵文字は1つまで\n\
         ・1行で完結（改行は \\n を使用）\n",
        details = details.join(" / "),
    )
}

/// Turn a raw completion into a stored post ending with `short_url`.
///
/// Real line breaks become `\n` escapes, URLs and leading labels are
/// stripped, runs of breaks are collapsed, and hashtags start on their own
/// line. Completions that echo placeholders or contain no Japanese are
/// rejected.
pub fn sanitize_post(raw: &str, short_url: &str) -> Result<String, PostRejection> {
    let mut text = escape_line_breaks(raw);

    text = URL_RE.replace_all(&text, "").into_owned();
    text = text.replace("[短縮URL]", LINE_BREAK).replace("【短縮URL】", LINE_BREAK);

    text = LEADING_LABEL_RE.replace(&text, "").into_owned();
    text = LEADING_EXAMPLE_RE.replace(&text, "").into_owned();
    text = text.replace("本文：", "").replace("投稿内容：", "");
    text = TRAILING_NOISE_RE.replace(&text, "").into_owned();

    text = collapse_breaks(&text);
    if text.is_empty() {
        return Err(PostRejection::Empty);
    }

    if PLACEHOLDER_RE.is_match(&text) || TEMPLATE_WORDS.iter().any(|w| text.contains(w)) {
        return Err(PostRejection::Placeholder);
    }
    if !JAPANESE_RE.is_match(&text) {
        return Err(PostRejection::NotJapanese);
    }

    if text.contains('#') {
        text = text.replace(" #", "\\n#").replace("　#", "\\n#");
        text = HASHTAG_RE.replace_all(&text, "${1}\\n#").into_owned();
    }

    Ok(format!("{text}{LINE_BREAK}{LINE_BREAK}{short_url}"))
}

/// Collapse three or more escaped breaks to two and trim breaks and
/// whitespace from both ends.
fn collapse_breaks(text: &str) -> String {
    let triple = LINE_BREAK.repeat(3);
    let double = LINE_BREAK.repeat(2);
    let mut text = text.to_string();
    while text.contains(&triple) {
        text = text.replace(&triple, &double);
    }
    loop {
        let trimmed = text
            .trim()
            .trim_start_matches(LINE_BREAK)
            .trim_end_matches(LINE_BREAK)
            .trim();
        if trimmed.len() == text.len() {
            break;
        }
        text = trimmed.to_string();
    }
    text
}

/// Interleave two post streams: `a[0], b[0], a[1], b[1], ...`, then the
/// remainder of the longer one. Trailing newlines are dropped.
pub fn merge_alternate<A, B>(a: &[A], b: &[B]) -> Vec<String>
where
    A: AsRef<str>,
    B: AsRef<str>,
{
    let len = a.len().max(b.len());
    let mut merged = Vec::with_capacity(a.len() + b.len());
    for i in 0..len {
        if let Some(line) = a.get(i) {
            merged.push(line.as_ref().trim_end_matches(['\r', '\n']).to_string());
        }
        if let Some(line) = b.get(i) {
            merged.push(line.as_ref().trim_end_matches(['\r', '\n']).to_string());
        }
    }
    merged
}

/// Strip escaped line breaks from a merged line.
///
/// Merged output is pasted into schedulers that do not understand the
/// escape, so breaks are removed rather than converted.
pub fn flatten_line(line: &str) -> String {
    line.replace(LINE_BREAK, "")
}

/// Replace real line breaks with the stored `\n` escape.
pub fn escape_line_breaks(text: &str) -> String {
    text.replace("\r\n", LINE_BREAK).replace('\n', LINE_BREAK)
}

/// Line written in place of a post that could not be produced.
pub fn failed_post_line(reason: &str) -> String {
    format!("{ERROR_MARKER} {reason}")
}

/// Generate one stored post line per product.
///
/// Each prompt comes from [`affiliate_prompt`] and each completion goes
/// through [`sanitize_post`] with the product's short URL. Rejected
/// completions are re-run in the batch's retry passes like failed calls;
/// whatever is still failing at the end becomes a [`failed_post_line`].
pub async fn generate_affiliate_posts(
    batch: &BatchGenerator,
    products: &[AffiliateProduct],
    max_name_chars: usize,
) -> Vec<String> {
    let prompts: Vec<String> = products
        .iter()
        .map(|product| affiliate_prompt(product, max_name_chars))
        .collect();

    batch
        .run_with(&prompts, |index, text| {
            sanitize_post(text, &products[index].short_url).map_err(|e| e.to_string())
        })
        .await
        .into_iter()
        .map(|entry| match entry.result {
            Ok(post) => post,
            Err(reason) => failed_post_line(&reason),
        })
        .collect()
}

/// Whether a stored post is missing or an error marker.
pub fn is_failed_post(post: &str) -> bool {
    let post = post.trim();
    post.is_empty() || post.starts_with(ERROR_MARKER)
}
