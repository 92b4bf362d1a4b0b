// Settings invariants as seen through the compiled parameter record

use crate::common::helpers::{runner_with, wait_terminal};
use crate::common::mocks::{FixedProbe, MockEngine, MockFileSystem, Script, write_output_to};
use restorer::engine::{EngineStatus, JobPhase, PATH_MAX, Settings};
use std::sync::Arc;

#[test]
fn test_zero_strength_disables_second_set_features() {
    let mut s = Settings::default();
    s.set_use_denoise_2(true);
    s.set_use_deblock_2(true);
    s.set_use_grain_2(true);
    s.set_denoise_strength_2("0");
    s.set_deblock_thresh_2("");
    s.set_grain_strength_2("0.000");

    let r = s.compile("");
    assert_eq!(r.use_denoise_2, 0);
    assert_eq!(r.use_deblock_2, 0);
    assert_eq!(r.use_grain_2, 0);
}

#[test]
fn test_enabling_degenerate_feature_reseeds_strength() {
    let mut s = Settings::default();
    s.set_deblock_thresh_2("0");
    s.set_use_deblock_2(true);
    s.set_dering_strength_2("");
    s.set_use_dering_2(true);

    let r = s.compile("");
    assert_eq!(r.use_deblock_2, 1);
    assert_eq!(r.deblock_thresh_2.as_str(), "0.5");
    assert_eq!(r.use_dering_2, 1);
    assert_eq!(r.dering_strength_2.as_str(), "0.5");
}

#[test]
fn test_unsharp_second_set_uses_triple() {
    let mut s = Settings::default();
    s.set_sharpen_method_2("unsharp");
    s.set_usm_radius_2("0");
    s.set_usm_amount_2("0");
    s.set_usm_threshold_2("0");
    assert!(!s.use_sharpen_2());

    s.set_use_sharpen_2(true);
    assert!(s.use_sharpen_2());
    assert_eq!(s.usm_radius_2(), "5");
    assert_eq!(s.usm_amount_2(), "1.0");
    assert_eq!(s.usm_threshold_2(), "0.03");
}

#[test]
fn test_stacked_denoise_is_attenuated_in_record() {
    let mut s = Settings::default();
    s.set_use_denoise_2(true);
    s.set_denoise_strength_2("4");

    let r = s.compile("");
    assert_eq!(r.denoise_strength_2.as_str(), "2.20");
    assert_eq!(s.denoise_strength_2(), "4", "settings keep the user value");

    s.no_denoise = true;
    assert_eq!(s.compile("").denoise_strength_2.as_str(), "4");
}

#[test]
fn test_oversized_paths_are_truncated() {
    let mut s = Settings::default();
    s.lut_path = format!("/luts/{}", "a".repeat(PATH_MAX * 2));
    s.ai_model_path = "é".repeat(PATH_MAX);

    let r = s.compile(&"d".repeat(PATH_MAX + 10));
    assert_eq!(r.lut3d_file.as_str().len(), PATH_MAX - 1);
    assert_eq!(r.outdir.as_str().len(), PATH_MAX - 1);
    assert!(r.ai_model.as_str().len() < PATH_MAX);
    assert!(r.ai_model.as_str().chars().all(|c| c == 'é'));
}

#[test]
fn test_engine_receives_compiled_settings() {
    let fs = Arc::new(MockFileSystem::new());
    let engine = Arc::new(
        MockEngine::new(Script::new(&[], EngineStatus::Ok)).on_finish(write_output_to(&fs, 1)),
    );
    let mut runner = runner_with(&engine, &fs, FixedProbe::seconds(10.0));
    runner.settings.use_hevc = true;
    runner.settings.crf = 21.9;
    runner.settings.set_denoiser("hqdn3d");

    let expected = runner.compile();
    runner.run().unwrap();
    assert_eq!(wait_terminal(&runner), JobPhase::Completed);

    let records = engine.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0], expected);
    assert_eq!(records[0].codec.as_str(), "hevc");
    assert_eq!(records[0].crf.as_str(), "21");
    assert_eq!(records[0].denoiser.as_str(), "hqdn3d");
}
