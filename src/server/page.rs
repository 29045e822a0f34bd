// Single-page HTML front end

use crate::studio::types::{DEFAULT_NEGATIVE_PROMPT, DIMENSIONS, Style};
use imagent::ComputeDevice;

const TEMPLATE: &str = r#"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>AI-Powered Text-to-Image Generator</title>
<style>
  body { margin: 0; font-family: system-ui, sans-serif; background: #020617; color: #e5e7eb; }
  main { display: grid; grid-template-columns: 1fr 1.1fr; gap: 1.5rem; padding: 2rem 2.5rem; }
  header { display: flex; justify-content: space-between; align-items: center; padding: 1.5rem 2.5rem 0; }
  h1 { margin: 0; font-size: 1.8rem; }
  .card { background: rgba(15, 23, 42, 0.9); border: 1px solid rgba(148, 163, 184, 0.2); border-radius: 18px; padding: 1.2rem 1.4rem; }
  .title { font-size: 0.85rem; letter-spacing: 0.08em; text-transform: uppercase; color: #9ca3af; margin: 0.6rem 0 0.3rem; }
  label { display: block; margin-top: 0.7rem; font-size: 0.9rem; }
  textarea, select, input[type=range] { width: 100%; box-sizing: border-box; }
  textarea, select { background: #0f172a; color: #e5e7eb; border: 1px solid #334155; border-radius: 8px; padding: 0.5rem; }
  button { margin-top: 1rem; width: 100%; padding: 0.7rem; border: 0; border-radius: 10px; background: #6366f1; color: white; font-weight: 600; cursor: pointer; }
  button:disabled { opacity: 0.5; cursor: wait; }
  .device { font-weight: 600; }
  #status.error { color: #f87171; }
  #gallery { display: grid; grid-template-columns: repeat(auto-fill, minmax(220px, 1fr)); gap: 1rem; margin-top: 1rem; }
  figure { margin: 0; }
  figure img { width: 100%; border-radius: 10px; }
  figcaption a { color: #a5b4fc; margin-right: 0.8rem; }
</style>
</head>
<body>
<header>
  <div>
    <h1>AI-Powered Text-to-Image Generator</h1>
    <div class="title">Stable Diffusion, watermarked and saved with metadata</div>
  </div>
  <div><div class="title">Runtime device</div><div class="device">{{device}}</div></div>
</header>
<main>
  <form id="form" class="card">
    <div class="title">Prompt</div>
    <label for="prompt">Describe the scene you want to generate</label>
    <textarea id="prompt" rows="4">a futuristic city at sunset, highly detailed, 4K, cinematic lighting</textarea>

    <div class="title">Style &amp; Quality</div>
    <label for="style">Artistic style</label>
    <select id="style">{{styles}}</select>

    <label>Number of images: <span id="num_images_value">1</span>
      <input id="num_images" type="range" min="1" max="4" step="1" value="1"></label>
    <label>Guidance scale: <span id="guidance_scale_value">7.5</span>
      <input id="guidance_scale" type="range" min="3" max="15" step="0.5" value="7.5"></label>
    <label>Diffusion steps: <span id="steps_value">30</span>
      <input id="steps" type="range" min="10" max="50" step="5" value="30"></label>

    <details>
      <summary class="title">Advanced controls</summary>
      <label for="negative_prompt">Negative prompt</label>
      <textarea id="negative_prompt" rows="2">{{negative_prompt}}</textarea>
      <label for="height">Image height</label>
      <select id="height">{{dimensions}}</select>
      <label for="width">Image width</label>
      <select id="width">{{dimensions}}</select>
    </details>

    <button id="submit" type="submit">Generate Images</button>
  </form>

  <section class="card">
    <div class="title">Output</div>
    <div id="status">Generate an image to see results here.</div>
    <div id="gallery"></div>
  </section>
</main>
<script>
  for (const id of ["num_images", "guidance_scale", "steps"]) {
    const input = document.getElementById(id);
    input.addEventListener("input", () => {
      document.getElementById(id + "_value").textContent = input.value;
    });
  }

  document.getElementById("form").addEventListener("submit", async (event) => {
    event.preventDefault();
    const status = document.getElementById("status");
    const gallery = document.getElementById("gallery");
    const button = document.getElementById("submit");
    const value = (id) => document.getElementById(id).value;

    const request = {
      prompt: value("prompt"),
      negative_prompt: value("negative_prompt"),
      style: value("style"),
      num_images: Number(value("num_images")),
      guidance_scale: Number(value("guidance_scale")),
      steps: Number(value("steps")),
      height: Number(value("height")),
      width: Number(value("width")),
    };

    status.className = "";
    status.textContent = "Generation started. This may take some time depending on your hardware.";
    gallery.innerHTML = "";
    button.disabled = true;

    try {
      const response = await fetch("/api/generate", {
        method: "POST",
        headers: { "Content-Type": "application/json" },
        body: JSON.stringify(request),
      });
      const body = await response.json();
      if (!response.ok) {
        status.className = "error";
        status.textContent = body.error;
        return;
      }
      for (const image of body.images) {
        const figure = document.createElement("figure");
        figure.innerHTML =
          `<img src="${image.png}" alt="Variant ${image.index + 1}">` +
          `<figcaption>Variant ${image.index + 1} ` +
          `<a href="${image.png}" download>Download PNG</a>` +
          `<a href="${image.jpg}" download>Download JPG</a></figcaption>`;
        gallery.appendChild(figure);
      }
      status.textContent = "Images generated, watermarked, and saved with metadata.";
    } catch (err) {
      status.className = "error";
      status.textContent = String(err);
    } finally {
      button.disabled = false;
    }
  });
</script>
</body>
</html>
"#;

pub fn render(device: ComputeDevice) -> String {
    let styles: String = Style::ALL
        .iter()
        .map(|style| format!("<option>{}</option>", style.label()))
        .collect();
    let dimensions: String = DIMENSIONS
        .iter()
        .map(|size| format!("<option value=\"{size}\">{size}</option>"))
        .collect();

    TEMPLATE
        .replace("{{device}}", device.as_str())
        .replace("{{styles}}", &styles)
        .replace("{{dimensions}}", &dimensions)
        .replace("{{negative_prompt}}", DEFAULT_NEGATIVE_PROMPT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_fills_every_placeholder() {
        let html = render(ComputeDevice::Cuda);
        assert!(!html.contains("{{"));
        assert!(html.contains("<option>Concept Art</option>"));
        assert!(html.contains("<option value=\"768\">768</option>"));
        assert!(html.contains(">cuda<"));
    }
}
