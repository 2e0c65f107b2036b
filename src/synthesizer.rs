use super::*;

pub(crate) const NO_CONTENT_PAGE: &str =
    "<!doctype html><html><body><h1>Error</h1><p>No content returned.</p></body></html>";

pub(crate) const INVALID_STRUCTURE_PAGE: &str = "<!doctype html><html><body><h1>Error</h1><p>Invalid HTML structure returned by Gemini.</p></body></html>";

/// Builds a prompt for a route, runs it through the generator, and scrubs
/// and validates whatever comes back. Always yields a full HTML document;
/// only transport-level generation failures escape to the caller.
#[derive(Clone)]
pub(crate) struct Synthesizer {
    generator: Arc<dyn TextGenerator>,
}

impl Synthesizer {
    pub(crate) fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    pub(crate) async fn synthesize(
        &self,
        route_path: &str,
        base_url: &str,
    ) -> Result<String, GenerateError> {
        let route_path = if route_path.is_empty() { "/" } else { route_path };

        info!("Generating HTML for route: {route_path}");

        let response = self
            .generator
            .generate(&prompt(route_path, base_url))
            .await?;

        let html = match response.text() {
            Some(text) => scrub(&text),
            None => NO_CONTENT_PAGE.into(),
        };

        if !plausible_html(&html) {
            error!("Invalid HTML structure detected for {route_path}, returning error page");
            return Ok(INVALID_STRUCTURE_PAGE.into());
        }

        info!("Generated {} bytes for {route_path}", html.len());

        Ok(html)
    }
}

pub(crate) fn prompt(route_path: &str, base_url: &str) -> String {
    let full_url = format!("{base_url}{route_path}");
    let deep = format!("{base_url}{}", route_path.trim_end_matches('/'));

    format!(
        "\
You are a web designer. For the following URL: {full_url}, generate a SINGLE, fully self-contained, valid HTML5 document.

STRICT REQUIREMENTS:
1. OUTPUT:
   - Output ONLY the final HTML code, nothing else (no markdown, no explanations).
   - Document MUST start with <!doctype html>, contain <html lang=\"en\">, a <head> (with <meta charset>, viewport, <title>), and a <body>.

2. STYLING:
   - All CSS must be inline in a single <style> tag in the <head>.
   - Use system fonts (no external fonts).
   - Minimal but modern design: centered layout, fluid spacing, gradients, soft shadows, rounded corners.
   - Ensure good contrast, visible focus outlines, and responsive layout (mobile-first but looks good on desktop).

3. INTERACTIVITY:
   - If JavaScript is needed, it must be inline in a single <script> tag at the end of <body>.
   - Keep JS short and efficient (e.g., random suffix for links).

4. NAVIGATION:
   - Include a header or nav bar plus an \"Explore\" section.
   - Provide at least 6 navigation links.
   - ALL links must be absolute and same-origin, starting with {base_url}.
   - Each link must go deeper under the current route {route_path}, e.g.:
     {deep}/about
     {deep}/gallery
     {deep}/services
     {deep}/contact
     {deep}/blog/2025/launch
     {deep}/play/demo
   - At least 3 links must get a short random suffix via JS (e.g., \"-x7\").

5. CONTENT:
   - Simple structure only (to keep generation fast):
     - Hero section: big headline, subheadline, 2 CTA buttons.
     - Explore section: grid of link-buttons (styled <a role=\"button\">).
     - Footer: repeat sitemap-style links.
   - No heavy feature grids, no long text, keep content concise.

6. SECURITY / ROBUSTNESS:
   - No external assets (no <link>, @import, external <script>, external images).
   - If images are needed, use inline SVG placeholders only.
   - No mustache-style template placeholders.
"
    )
}

/// Models that wrap their output in a markdown code fence leave ``` markers
/// and an `html` language tag behind.
fn scrub(text: &str) -> String {
    let text = text.replace("```", "");

    match text.strip_prefix("html\n") {
        Some(stripped) => stripped.to_string(),
        None => text,
    }
}

fn plausible_html(html: &str) -> bool {
    let lowered = html.trim().to_lowercase();

    lowered.starts_with("<!doctype html>")
        && lowered.contains("<html")
        && lowered.contains("<body")
}
