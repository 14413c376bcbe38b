use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use dialect_tts::{
    artifacts::ArtifactResolver,
    config::Settings,
    engines::onnx::OnnxLoader,
    episode::{Article, EpisodeProducer, LocalStore, Readiness},
    llm::{ChatClient, DialectRewriter, TextService, ToneClassifier},
    pipeline::SynthesisPipeline,
    voices::VoiceRegistry,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let settings = Settings::load(None)?;
    let resolver = ArtifactResolver::from_settings(&settings.storage)?;

    let loader = OnnxLoader {
        optimized_cache_dir: Some(settings.storage.cache_dir.join("ort")),
        ..Default::default()
    };
    let load_start = Instant::now();
    let (registry, statuses) = VoiceRegistry::initialize(
        &settings.voices,
        &settings.tts.default_voice,
        &loader,
        &resolver,
    );
    println!("Voices loaded in {:.2?}: {:?}", load_start.elapsed(), registry.available());

    let service: Arc<dyn TextService> = Arc::new(ChatClient::new(settings.llm.client_config()));
    let readiness = Readiness::new(service.as_ref(), statuses);
    println!("{}", serde_json::to_string_pretty(&readiness)?);
    if !readiness.tts_ready() {
        return Err("no voice profile could be loaded".into());
    }

    let pipeline = SynthesisPipeline::new(Arc::new(registry), settings.tts.pipeline_config())?;
    let rewriter = DialectRewriter::new(Arc::clone(&service), settings.llm.rewriter_config());
    let classifier = ToneClassifier::new(Arc::clone(&service), settings.llm.classifier_model.clone());
    let producer = EpisodeProducer::new(
        rewriter,
        Arc::new(pipeline),
        Box::new(LocalStore),
        settings.publisher.clone(),
    )?
    .with_classifier(classifier, settings.tts.serious_voice.clone());

    let articles: Vec<Article> = match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => vec![Article {
            title: "افتتاح موسم الرياض".to_string(),
            description: "أعلنت الهيئة العامة للترفيه اليوم عن افتتاح فعاليات موسم الرياض، \
                          والتي تتضمن عروضاً فنية ومسرحية متنوعة تستمر حتى نهاية العام."
                .to_string(),
            date: "Sun, 23 Nov 2025 00:16:15 +0300".to_string(),
            source: None,
        }],
    };

    let start = Instant::now();
    let report = producer.produce_batch(&articles);
    println!(
        "Produced {}/{} episodes in {:.2?}",
        report.processed(),
        report.total,
        start.elapsed()
    );
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
