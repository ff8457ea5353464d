//! Analyze command handler.

use std::sync::Arc;

use anyhow::Result;
use visor_core::auth::SessionStore;
use visor_core::config::Config;
use visor_core::images::{FsImageSource, ImageRef, ImageSource, path_mime};
use visor_core::vision::{HttpVisionService, ImageActionDispatcher, ImageOperation};

pub struct AnalyzeRunOptions<'a> {
    pub image: &'a str,
    pub text: bool,
    pub labels: bool,
    pub config: &'a Config,
}

pub async fn run(options: AnalyzeRunOptions<'_>) -> Result<()> {
    let store = SessionStore::load()?;
    let Some(session) = store.current_user() else {
        anyhow::bail!("Not signed in. Run `visor login` first.");
    };

    // Only image files are selectable.
    if path_mime::mime_type_for_extension(options.image).is_none() {
        anyhow::bail!("Unsupported image type: {}", options.image);
    }

    let path = path_mime::normalize_input_path(options.image);
    let source = Arc::new(FsImageSource::with_selection(
        ImageRef::new(path),
        options.config.vision.max_dims(),
    ));
    let vision = Arc::new(HttpVisionService::new(
        options.config.backend.effective_base_url(),
        session.access_token.clone(),
    ));

    let mut dispatcher =
        ImageActionDispatcher::new(Arc::clone(&source) as Arc<dyn ImageSource>, vision);

    let image = source.pick_image().await?;
    dispatcher.select_image(image)?;

    // With neither flag, run both operations.
    let both = !options.text && !options.labels;
    let mut operations = Vec::new();
    if options.text || both {
        operations.push(ImageOperation::ExtractText);
    }
    if options.labels || both {
        operations.push(ImageOperation::GenerateLabels);
    }

    // Independent operations, dispatched back-to-back.
    for operation in &operations {
        dispatcher.dispatch(*operation)?;
    }

    let mut failures = 0usize;
    for _ in 0..operations.len() {
        let Some(completion) = dispatcher.next_completion().await else {
            break;
        };
        if let Err(err) = &completion.outcome {
            eprintln!("{}: {err}", completion.operation);
            failures += 1;
        }
    }

    if let Some(text) = dispatcher.text_channel() {
        println!("Extracted text:");
        for line in text.lines() {
            println!("  {line}");
        }
    }
    if let Some(labels) = dispatcher.label_channel() {
        println!("Labels:");
        for label in labels {
            println!("  {label}");
        }
    }

    if failures == operations.len() {
        anyhow::bail!("all requested operations failed");
    }

    Ok(())
}
