use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use super::fakes::*;
use crate::config::QuizSyncConfig;
use crate::error::QuizSyncError;
use crate::script::parser::parse;
use crate::script::types::{ComponentId, ComponentKind, Timeline};
use crate::tts::fitter::SpeechFitter;
use crate::utils::temp::RenderWorkspace;

fn scenario_a() -> Timeline {
    parse(SCENARIO_A, None)
}

fn fitter(synth: &Arc<FakeSynthesizer>, media: &Arc<FakeMedia>) -> SpeechFitter {
    SpeechFitter::new(synth.clone(), media.clone(), &QuizSyncConfig::default())
}

/// Речь длиннее слота ускоряется до длины слота
#[tokio::test]
async fn test_long_speech_is_stretched_to_slot() {
    let dir = tempfile::tempdir().unwrap();
    let workspace = RenderWorkspace::new(Some(dir.path()), true).unwrap();
    let synth = Arc::new(FakeSynthesizer::new(2.0).with_duration("What is the capital of France?", 7.5));
    let media = Arc::new(FakeMedia::new());

    let timeline = scenario_a();
    let question = &timeline.components()[0];
    let asset = fitter(&synth, &media).fit(question, &workspace).await.unwrap().unwrap();

    assert!((asset.duration - 5.0).abs() <= 0.15);
    assert!((asset.speed_factor - 1.5).abs() < 1e-9);
    assert_eq!(asset.owner, ComponentId(0));
    assert!(asset.path.exists());

    // Нормализация всегда до измерения и растяжения
    assert_eq!(media.calls(), vec!["normalize question_0_raw.wav -20", "tempo 1.5000"]);
    // Промежуточные файлы удалены
    assert!(!workspace.file("question_0_raw.wav").exists());
    assert!(!workspace.file("question_0_normalized.wav").exists());
}

/// Короткая речь не растягивается и не добивается тишиной
#[tokio::test]
async fn test_short_speech_is_used_as_is() {
    let dir = tempfile::tempdir().unwrap();
    let workspace = RenderWorkspace::new(Some(dir.path()), true).unwrap();
    let synth = Arc::new(FakeSynthesizer::new(1.2));
    let media = Arc::new(FakeMedia::new());

    let timeline = scenario_a();
    let answer = &timeline.components()[2];
    let asset = fitter(&synth, &media).fit(answer, &workspace).await.unwrap().unwrap();

    assert_eq!(asset.duration, 1.2);
    assert_eq!(asset.speed_factor, 1.0);
    assert_eq!(media.count_calls("tempo"), 0);
    assert_eq!(media.count_calls("normalize"), 1);
}

/// Одна корректирующая попытка, затем ошибка подгонки
#[tokio::test]
async fn test_corrective_pass_then_failure() {
    let dir = tempfile::tempdir().unwrap();
    let workspace = RenderWorkspace::new(Some(dir.path()), true).unwrap();
    let synth = Arc::new(FakeSynthesizer::new(6.0));
    let timeline = scenario_a();
    let cta = &timeline.components()[3];

    let media = Arc::new(FakeMedia::new());
    *media.tempo_skew.lock().unwrap() = vec![1.1].into();
    let asset = fitter(&synth, &media).fit(cta, &workspace).await.unwrap().unwrap();
    assert!((asset.duration - 3.0).abs() <= 0.15);
    assert_eq!(media.count_calls("tempo"), 2);

    let media = Arc::new(FakeMedia {
        tempo_skew: Mutex::new(vec![1.1, 1.1].into()),
        ..FakeMedia::default()
    });
    let err = fitter(&synth, &media).fit(cta, &workspace).await.unwrap_err();
    match err {
        QuizSyncError::Fitting { component, .. } => assert_eq!(component, "cta#3"),
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(media.count_calls("tempo"), 2);
}

/// Обратный отсчёт озвучивает фиксированную фразу
#[tokio::test]
async fn test_countdown_speaks_fixed_phrase() {
    let dir = tempfile::tempdir().unwrap();
    let workspace = RenderWorkspace::new(Some(dir.path()), true).unwrap();
    let synth = Arc::new(FakeSynthesizer::new(2.4));
    let media = Arc::new(FakeMedia::new());

    let timeline = scenario_a();
    let countdown = &timeline.components()[1];
    fitter(&synth, &media).fit(countdown, &workspace).await.unwrap();

    assert_eq!(synth.texts(), vec!["Three. Two. One."]);
}

/// Пустой озвучиваемый текст оставляет компонент тихим
#[tokio::test]
async fn test_silent_component_yields_no_asset() {
    let dir = tempfile::tempdir().unwrap();
    let workspace = RenderWorkspace::new(Some(dir.path()), true).unwrap();
    let synth = Arc::new(FakeSynthesizer::new(1.0));
    let media = Arc::new(FakeMedia::new());

    let timeline = parse("[0-2] ANSWER: ✨🎉", None);
    let result = fitter(&synth, &media).fit(&timeline.components()[0], &workspace).await.unwrap();

    assert!(result.is_none());
    assert!(synth.texts().is_empty());
}

/// Ошибка синтеза несёт компонент и может быть заменена запасным текстом
#[tokio::test]
async fn test_synthesis_failure_and_fallback_text() {
    let dir = tempfile::tempdir().unwrap();
    let workspace = RenderWorkspace::new(Some(dir.path()), true).unwrap();
    let synth = Arc::new(FakeSynthesizer::new(1.0).failing_on("Paris"));
    let media = Arc::new(FakeMedia::new());
    let timeline = scenario_a();
    let fitter = fitter(&synth, &media);

    let err = fitter
        .fit_all(&timeline, &workspace, &HashMap::new(), &None)
        .await
        .unwrap_err();
    match &err {
        QuizSyncError::Synthesis { component, message } => {
            assert_eq!(component, "answer#2");
            assert!(message.contains("503"));
        }
        other => panic!("unexpected error: {}", other),
    }

    let mut fallback = HashMap::new();
    fallback.insert(ComponentKind::Answer, "The answer is Paris".to_string());
    let audio = fitter
        .fit_all(&timeline, &workspace, &fallback, &None)
        .await
        .unwrap();

    assert_eq!(audio.len(), 4);
    assert!(synth.texts().contains(&"The answer is Paris".to_string()));
    assert!(audio.get(ComponentId(2)).is_some());
}

/// Все компоненты подогнаны, клипы удаляются после release
#[tokio::test]
async fn test_fit_all_and_release() {
    let dir = tempfile::tempdir().unwrap();
    let workspace = RenderWorkspace::new(Some(dir.path()), true).unwrap();
    let synth = Arc::new(FakeSynthesizer::new(9.0));
    let media = Arc::new(FakeMedia::new());
    let timeline = scenario_a();

    let audio = fitter(&synth, &media)
        .fit_all(&timeline, &workspace, &HashMap::new(), &None)
        .await
        .unwrap();

    for component in timeline.components() {
        let asset = audio.get(component.id).unwrap();
        assert!((asset.duration - component.duration()).abs() <= 0.15, "{}", component.label());
    }

    let paths: Vec<_> = audio.iter().map(|a| a.path.clone()).collect();
    audio.release().await;
    assert!(paths.iter().all(|p| !p.exists()));
}
