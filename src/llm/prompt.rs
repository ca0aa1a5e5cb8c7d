//! Prompt construction for summarization and chat
//!
//! Content bundles are truncated deterministically before being sent
//! upstream: each page gets an equal share of the model's character
//! budget, so a crawl with more pages sends proportionally less of each.

use crate::crawl::CrawledSite;
use crate::llm::ModelChoice;

/// Per-page character budget for a content bundle
fn page_budget(total_pages: u32, model: ModelChoice) -> usize {
    let pages = total_pages.max(1) as usize;
    model.parameters().max_content_length / pages
}

/// Labels for the per-page content sections
///
/// The Thai chat prompt localizes these; every other prompt uses the
/// English set.
struct SectionLabels {
    page: &'static str,
    title: &'static str,
    description: &'static str,
    content: &'static str,
    truncation: &'static str,
}

const ENGLISH_LABELS: SectionLabels = SectionLabels {
    page: "Page",
    title: "Title",
    description: "Description",
    content: "Content",
    truncation: "content truncated",
};

const THAI_LABELS: SectionLabels = SectionLabels {
    page: "หน้า",
    title: "ชื่อหน้า",
    description: "คำอธิบาย",
    content: "เนื้อหา",
    truncation: "เนื้อหาถูกตัดทอน",
};

/// Truncate page content to its budget, marking the cut
fn truncated(content: &str, budget: usize, marker: &str) -> String {
    if content.chars().count() <= budget {
        return content.to_string();
    }
    let cut: String = content.chars().take(budget).collect();
    format!("{} ... ({})", cut, marker)
}

/// Language-specific response instructions for the LLM
pub fn language_instructions(language: &str) -> String {
    let name = match language {
        "en" => "English",
        "th" => "Thai",
        "zh" => "Chinese",
        "ja" => "Japanese",
        "ko" => "Korean",
        other => other,
    };

    let mut prompt = format!("Respond in {}.", name);
    match language {
        "zh" => prompt.push_str(" 在中文和英文之间添加适当的空格来提升可读性"),
        "ja" => {
            prompt.push_str(" 日本語で回答する際は、専門用語には適宜英語を併記してください。")
        }
        "ko" => prompt.push_str(" 한국어로 응답할 때는 전문 용어에 영어를 함께 표기해 주세요."),
        "th" => prompt.push_str(
            " เมื่อตอบเป็นภาษาไทย กรุณาใช้คำศัพท์ที่เข้าใจง่ายและเพิ่มคำศัพท์ภาษาอังกฤษสำหรับคำศัพท์เฉพาะทาง",
        ),
        _ => {}
    }
    prompt
}

/// Render the per-page content sections shared by both prompts
fn page_sections(site: &CrawledSite, model: ModelChoice, labels: &SectionLabels) -> String {
    let budget = page_budget(site.total_pages, model);
    site.pages
        .iter()
        .enumerate()
        .map(|(index, page)| {
            let description = page
                .description
                .as_deref()
                .filter(|d| !d.is_empty())
                .map(|d| format!("{}: {}\n", labels.description, d))
                .unwrap_or_default();
            format!(
                "--- {} {}: {} ---\n{}: {}\n{}{}:\n{}",
                labels.page,
                index + 1,
                page.url,
                labels.title,
                page.title,
                description,
                labels.content,
                truncated(&page.content, budget, labels.truncation)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Build the summarization prompt for a crawled site
pub fn summary_prompt(site: &CrawledSite, language: &str, model: ModelChoice) -> String {
    format!(
        "You are an AI assistant that summarizes website content.\n\n\
         {instructions}\n\n\
         Main Website URL: {url}\n\
         Main Website Title: {title}\n\
         Total Pages Crawled: {total}\n\n\
         If the website content is blocked, please say so.\n\
         Please provide a comprehensive summary of the following website content.\n\
         Focus on the main topics, key information, and overall purpose of the website.\n\
         Format your response in clear paragraphs with appropriate spacing.\n\
         Keep your summary concise.\n\n\
         Website Content (from {pages} pages):\n{sections}",
        instructions = language_instructions(language),
        url = site.url,
        title = site.title,
        total = site.total_pages,
        pages = site.pages.len(),
        sections = page_sections(site, model, &ENGLISH_LABELS),
    )
}

/// Build the chat system prompt for a crawled site
///
/// Instructs the model to answer with numbered citations and a trailing
/// references section so the UI can link answers back to source pages.
pub fn chat_system_prompt(site: &CrawledSite, language: &str, model: ModelChoice) -> String {
    if language == "th" {
        return format!(
            "คุณเป็นผู้ช่วย AI ที่ช่วยผู้ใช้เข้าใจเนื้อหาเว็บไซต์\n\n\
             URL เว็บไซต์หลัก: {url}\n\
             ชื่อเว็บไซต์: {title}\n\
             จำนวนหน้าทั้งหมด: {total}\n\n\
             โปรดตอบคำถามของผู้ใช้ตามเนื้อหาเว็บไซต์ต่อไปนี้\n\
             หากคำตอบไม่อยู่ในเนื้อหา คุณสามารถบอกว่าคุณไม่มีข้อมูลนั้น\n\n\
             สำคัญ:\n\
             1. เนื้อหาอาจรวมข้อมูลจากหลายหน้าของเว็บไซต์หรือเว็บไซต์ที่เกี่ยวข้อง\n\
             2. เมื่อให้ข้อมูล ใช้การอ้างอิงแบบตัวเลขเช่น [1], [2], ฯลฯ\n\
             3. สำหรับการอ้างอิงแต่ละรายการ จำ URL เฉพาะที่ข้อมูลมาจาก\n\
             4. ท้ายคำตอบของคุณ ให้รวมส่วนอ้างอิงในรูปแบบ markdown ที่แสดงรายการ URL แหล่งที่มาทั้งหมด\n\
             5. จัดรูปแบบส่วนอ้างอิงดังนี้:\n\n\
             **อ้างอิง:**\n\
             [1]: [URL จริงสำหรับการอ้างอิง 1]\n\
             [2]: [URL จริงสำหรับการอ้างอิง 2]\n\n\
             6. คำตอบของคุณควรอยู่ในรูปแบบ markdown\n\
             7. รักษาคำตอบของคุณให้กระชับ\n\n\
             เนื้อหาเว็บไซต์ (จาก {pages} หน้า):\n{sections}",
            url = site.url,
            title = site.title,
            total = site.total_pages,
            pages = site.pages.len(),
            sections = page_sections(site, model, &THAI_LABELS),
        );
    }

    format!(
        "You are an AI assistant that helps users understand website content.\n\n\
         Main Website URL: {url}\n\
         Website Title: {title}\n\
         Total Pages: {total}\n\n\
         Please answer the user's question based on the following website content.\n\
         If the answer is not in the content, you can say that you don't have that information.\n\n\
         Important:\n\
         1. The content may include information from multiple pages or related websites\n\
         2. When providing information, use numbered references like [1], [2], etc.\n\
         3. For each reference, remember the specific URL where the information came from\n\
         4. At the end of your answer, include a references section in markdown format listing all source URLs\n\
         5. Format the references section as follows:\n\n\
         **References:**\n\
         [1]: [actual URL for reference 1]\n\
         [2]: [actual URL for reference 2]\n\n\
         6. Your answer should be in markdown format\n\
         7. Keep your answer concise\n\n\
         Website Content (from {pages} pages):\n{sections}",
        url = site.url,
        title = site.title,
        total = site.total_pages,
        pages = site.pages.len(),
        sections = page_sections(site, model, &ENGLISH_LABELS),
    )
}

/// Drop any `<think>...</think>` preamble a reasoning model may emit
pub(crate) fn strip_thinking(text: &str) -> &str {
    match text.split_once("</think>") {
        Some((_, rest)) => rest.trim(),
        None => text.trim(),
    }
}
