//! Server-rendered HTML for the single page.

use crate::{
    error::{RemixError, Result},
    models::ImageFormat,
    session::{CompletedRemix, SessionPhase, SessionView},
};
use handlebars::Handlebars;
use serde_json::json;

pub const PAGE_TITLE: &str = "Image AI Recognizer";
pub const UPLOAD_FIRST: &str = "まずは画像をアップロードしてください";
pub const INSTRUCTION_PLACEHOLDER: &str = "画像をどのように加工したいか教えて下さい";
pub const GENERATING: &str = "DALL-E 3 で画像生成中...";
pub const GENERATED_HEADING: &str = "DALL-E 3 で生成した画像";

fn accept_attribute() -> String {
    ImageFormat::ACCEPTED_EXTENSIONS
        .iter()
        .map(|ext| format!(".{}", ext))
        .collect::<Vec<_>>()
        .join(",")
}

const PAGE_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="ja">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{{title}}</title>
<link rel="icon" href="data:image/svg+xml,<svg xmlns=%22http://www.w3.org/2000/svg%22 viewBox=%220 0 100 100%22><text y=%22.9em%22 font-size=%2290%22>🤖</text></svg>">
<style>{{{style}}}</style>
</head>
<body>
<h1>{{title}} 🤖</h1>
<section class="upload">
  <form action="/upload" method="post" enctype="multipart/form-data">
    <label for="file">Upload your Image here</label>
    <input id="file" type="file" name="file" accept="{{accept}}" required>
    <button type="submit">Upload</button>
  </form>
</section>
{{#if has_upload}}
<section class="current">
  <img class="preview" src="/upload/image" alt="{{upload_name}}">
  <p class="filename">{{upload_name}}</p>
</section>
<section id="live"{{#unless generating}} hidden{{/unless}}>
  <h2>Image Prompt</h2>
  <div id="prompt"></div>
  <div id="spinner"{{#unless generating}} hidden{{/unless}}><span class="spin"></span>{{generating_text}}</div>
  <p id="error" role="alert"></p>
</section>
<form id="chat" class="chat" autocomplete="off">
  <input name="instruction" placeholder="{{placeholder}}"{{#if generating}} disabled{{/if}}>
  <button type="submit"{{#if generating}} disabled{{/if}}>Send</button>
</form>
{{else}}
<p class="notice">{{upload_first}}</p>
{{/if}}
{{#with last}}
<section class="result">
  <h3>Question</h3>
  <p class="question">{{instruction}}</p>
  <div class="side-by-side">
    <figure>
      <img src="/result/image" alt="{{file_name}}">
      <figcaption>{{file_name}}</figcaption>
    </figure>
    <figure>
      <h3>{{heading}}</h3>
      <img src="{{url}}" alt="generated image">
      <figcaption>{{caption}}</figcaption>
    </figure>
  </div>
</section>
{{/with}}
<script>{{{script}}}</script>
</body>
</html>"#;

const STYLE: &str = r#"
body { font-family: system-ui, sans-serif; max-width: 1100px; margin: 2rem auto; padding: 0 1rem; }
.preview { max-height: 240px; }
.chat { display: flex; gap: .5rem; margin-top: 1rem; }
.chat input { flex: 1; padding: .6rem; }
#prompt { white-space: pre-wrap; background: #f5f5f5; padding: .8rem; min-height: 2rem; }
#error { color: #b00020; }
.side-by-side { display: grid; grid-template-columns: 1fr 1fr; gap: 1rem; }
.side-by-side img { width: 100%; }
.spin { display: inline-block; width: 1em; height: 1em; margin-right: .5em; border: 2px solid #ccc; border-top-color: #333; border-radius: 50%; animation: spin 1s linear infinite; }
@keyframes spin { to { transform: rotate(360deg); } }
"#;

// Reads the event stream from POST /remix and reloads once the result is stored in the session.
const SCRIPT: &str = r#"
(function () {
  const form = document.getElementById('chat');
  if (!form) return;
  const live = document.getElementById('live');
  const prompt = document.getElementById('prompt');
  const spinner = document.getElementById('spinner');
  const error = document.getElementById('error');

  const STREAM_LOST = 'The connection closed before an image was generated.';
  let terminal = false;

  function handle(kind, data) {
    if (kind === 'prompt_chunk') prompt.textContent += data.text;
    else if (kind === 'image_started') spinner.hidden = false;
    else if (kind === 'image_ready') { terminal = true; window.location.reload(); }
    else if (kind === 'error') { terminal = true; fail(data.message); }
  }

  function fail(message) {
    spinner.hidden = true;
    error.textContent = message;
    setDisabled(false);
  }

  function setDisabled(flag) {
    for (const el of form.elements) el.disabled = flag;
  }

  async function readEvents(resp) {
    const reader = resp.body.getReader();
    const decoder = new TextDecoder();
    let buffer = '';
    for (;;) {
      const { value, done } = await reader.read();
      if (done) break;
      buffer += decoder.decode(value, { stream: true });
      let idx;
      while ((idx = buffer.indexOf('\n\n')) >= 0) {
        const frame = buffer.slice(0, idx);
        buffer = buffer.slice(idx + 2);
        let kind = 'message', data = '';
        for (const line of frame.split('\n')) {
          if (line.startsWith('event: ')) kind = line.slice(7);
          else if (line.startsWith('data: ')) data += line.slice(6);
        }
        if (data) handle(kind, JSON.parse(data));
      }
    }
  }

  form.addEventListener('submit', async function (ev) {
    ev.preventDefault();
    const instruction = form.elements.instruction.value;
    if (!instruction.trim()) return;
    live.hidden = false;
    prompt.textContent = '';
    error.textContent = '';
    terminal = false;
    setDisabled(true);

    try {
      const resp = await fetch('/remix', {
        method: 'POST',
        headers: { 'Content-Type': 'application/x-www-form-urlencoded' },
        body: new URLSearchParams({ instruction: instruction }),
      });
      if (!resp.ok) { terminal = true; fail(await resp.text()); return; }
      await readEvents(resp);
    } catch (e) {
      terminal = true;
      fail(STREAM_LOST + ' (' + e.message + ')');
    } finally {
      if (!terminal) fail(STREAM_LOST);
    }
  });
})();
"#;

fn last_result(last: &CompletedRemix) -> serde_json::Value {
    json!({
        "instruction": last.instruction,
        "file_name": last.image.file_name,
        "url": last.generated.url,
        "caption": last.prompt,
        "heading": GENERATED_HEADING,
    })
}

/// Renders the page for the session's phase. Values are HTML-escaped by handlebars.
pub fn render_page(view: &SessionView) -> Result<String> {
    let has_upload = match view.phase {
        SessionPhase::AwaitingUpload => false,
        SessionPhase::AwaitingInstruction | SessionPhase::Generating => true,
    };

    let data = json!({
        "title": PAGE_TITLE,
        "style": STYLE,
        "script": SCRIPT,
        "accept": accept_attribute(),
        "has_upload": has_upload,
        "upload_name": view.upload_name.as_deref().unwrap_or_default(),
        "generating": view.phase == SessionPhase::Generating,
        "generating_text": GENERATING,
        "placeholder": INSTRUCTION_PLACEHOLDER,
        "upload_first": UPLOAD_FIRST,
        "last": view.last.as_ref().map(last_result),
    });

    Handlebars::new()
        .render_template(PAGE_TEMPLATE, &data)
        .map_err(|e| RemixError::Template(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{models::GeneratedImage, pipeline::testing::sample_image};
    use uuid::Uuid;

    fn view(phase: SessionPhase, last: Option<CompletedRemix>) -> SessionView {
        SessionView {
            id: Uuid::new_v4(),
            phase,
            upload_name: (phase != SessionPhase::AwaitingUpload).then(|| "tower.png".to_string()),
            last,
        }
    }

    #[test]
    fn test_awaiting_upload_page() {
        let html = render_page(&view(SessionPhase::AwaitingUpload, None)).unwrap();
        assert!(html.contains(UPLOAD_FIRST));
        assert!(html.contains(r#"accept=".png,.jpg,.jpeg,.webp,.gif""#));
        assert!(!html.contains(INSTRUCTION_PLACEHOLDER));
        assert!(!html.contains("class=\"result\""));
    }

    #[test]
    fn test_awaiting_instruction_page() {
        let html = render_page(&view(SessionPhase::AwaitingInstruction, None)).unwrap();
        assert!(!html.contains(UPLOAD_FIRST));
        assert!(html.contains(INSTRUCTION_PLACEHOLDER));
        assert!(html.contains(r#"<section id="live" hidden>"#));
        assert!(!html.contains(" disabled"));
    }

    #[test]
    fn test_generating_page_shows_spinner() {
        let html = render_page(&view(SessionPhase::Generating, None)).unwrap();
        assert!(html.contains(r#"<div id="spinner"><span class="spin"></span>DALL-E 3 で画像生成中...</div>"#));
        assert!(html.contains(" disabled"));
    }

    #[test]
    fn test_result_uses_url_and_prompt_caption() {
        let last = CompletedRemix {
            instruction: "<b>青</b>くして".to_string(),
            image: sample_image(),
            prompt: "A \"blue\" tower".to_string(),
            generated: GeneratedImage {
                url: "https://img.example/out.png?a=1&b=2".to_string(),
                revised_prompt: None,
            },
        };
        let html = render_page(&view(SessionPhase::AwaitingInstruction, Some(last))).unwrap();

        assert!(html.contains("<h3>Question</h3>"));
        assert!(html.contains("&lt;b&gt;青&lt;/b&gt;くして"));
        assert!(html.contains(r#"<img src="https://img.example/out.png?a"#));
        assert!(html.contains("&amp;b"));
        assert!(!html.contains("a=1&b=2"));
        assert!(html.contains("<figcaption>A &quot;blue&quot; tower</figcaption>"));
        assert!(html.contains(GENERATED_HEADING));
    }

    #[test]
    fn test_markup_in_file_name_is_escaped() {
        let mut view = view(SessionPhase::AwaitingInstruction, None);
        view.upload_name = Some("<img src=x onerror=alert(1)>.png".to_string());
        let html = render_page(&view).unwrap();

        assert!(html.contains(r#"<p class="filename">&lt;img src"#));
        assert!(!html.contains("<img src=x"));
    }

    #[test]
    fn test_script_and_style_are_not_escaped() {
        let html = render_page(&view(SessionPhase::AwaitingInstruction, None)).unwrap();
        assert!(html.contains(SCRIPT));
        assert!(html.contains(STYLE));
    }

    #[test]
    fn test_script_unlocks_form_when_stream_ends_early() {
        assert!(SCRIPT.contains("} finally {"));
        assert!(SCRIPT.contains("if (!terminal) fail(STREAM_LOST);"));
        assert!(SCRIPT.contains("} catch (e) {"));
    }
}
