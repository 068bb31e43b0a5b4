use std::collections::HashMap;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;

use super::*;
use crate::state::RecurrentState;

fn config(layers: Vec<LayerConfig>, num_classes: usize) -> RnnLmConfig {
    RnnLmConfig {
        num_classes,
        projection_size: 3,
        layers,
    }
}

fn input(model: &RnnLm, prev: &[u32], target: &[u32]) -> StepInput {
    let zero = RecurrentState::zeros(model.state_sizes());
    let states: Vec<&RecurrentState> = prev.iter().map(|_| &zero).collect();
    StepInput {
        prev_word_ids: prev.to_vec(),
        prev_class_ids: prev.to_vec(),
        target_class_ids: target.to_vec(),
        state: BatchState::combine(&states, model.state_sizes()).unwrap(),
    }
}

#[test]
fn parse_config_json() {
    let json = r#"{
        "num_classes": 10,
        "projection_size": 4,
        "layers": [{"type": "lstm", "size": 8}, {"type": "tanh", "size": 5}]
    }"#;
    let config = RnnLmConfig::parse_json(json).unwrap();
    assert_eq!(config.num_classes, 10);
    assert_eq!(
        config.layers,
        vec![LayerConfig::Lstm { size: 8 }, LayerConfig::Tanh { size: 5 }]
    );
}

#[test]
fn parse_config_rejects_bad_architectures() {
    assert!(RnnLmConfig::parse_json(r#"{"num_classes": 3, "projection_size": 2, "layers": []}"#)
        .is_err());
    assert!(RnnLmConfig::parse_json(
        r#"{"num_classes": 3, "projection_size": 2, "layers": [{"type": "gru", "size": 2}]}"#
    )
    .is_err());
    assert!(RnnLmConfig::parse_json(
        r#"{"num_classes": 3, "projection_size": 2, "layers": [{"type": "tanh", "size": 0}]}"#
    )
    .is_err());
}

#[test]
fn state_sizes_follow_layers() {
    let vb = VarBuilder::zeros(DType::F32, &Device::Cpu);
    let model = RnnLm::load(
        config(
            vec![LayerConfig::Lstm { size: 4 }, LayerConfig::Tanh { size: 2 }],
            5,
        ),
        vb,
    )
    .unwrap();
    assert_eq!(model.state_sizes(), &[4, 4, 2]);
}

#[test]
fn zero_weights_give_uniform_distribution() {
    let vb = VarBuilder::zeros(DType::F32, &Device::Cpu);
    let model = RnnLm::load(
        config(
            vec![LayerConfig::Lstm { size: 4 }, LayerConfig::Tanh { size: 2 }],
            5,
        ),
        vb,
    )
    .unwrap();

    let output = model.evaluate(&input(&model, &[0, 3, 4], &[1, 1, 2])).unwrap();
    assert_eq!(output.logprobs.len(), 3);
    for logprob in &output.logprobs {
        assert!((logprob + 5f32.ln()).abs() < 1e-5);
    }
    assert_eq!(output.state.batch_size(), 3);
    assert_eq!(output.state.sizes(), &[4, 4, 2]);
}

fn tanh_tensors(device: &Device) -> HashMap<String, Tensor> {
    // Two classes, projection size 1, one tanh unit:
    // h = tanh(proj[class] + 0.5 h_prev), logits = [0, h].
    let mut tensors = HashMap::new();
    let mut put = |name: &str, t: Tensor| {
        tensors.insert(name.to_string(), t);
    };
    put("projection.weight", Tensor::new(&[[0f32], [1.0]], device).unwrap());
    put("layers.0.input.weight", Tensor::new(&[[1f32]], device).unwrap());
    put("layers.0.input.bias", Tensor::new(&[0f32], device).unwrap());
    put("layers.0.recurrent.weight", Tensor::new(&[[0.5f32]], device).unwrap());
    put("output.weight", Tensor::new(&[[0f32], [1.0]], device).unwrap());
    put("output.bias", Tensor::new(&[0f32, 0.0], device).unwrap());
    tensors
}

fn tanh_config() -> RnnLmConfig {
    RnnLmConfig {
        num_classes: 2,
        projection_size: 1,
        layers: vec![LayerConfig::Tanh { size: 1 }],
    }
}

#[test]
fn tanh_layer_carries_state_between_steps() {
    let device = Device::Cpu;
    let model = RnnLm::from_tensors(tanh_config(), tanh_tensors(&device), &device).unwrap();

    let first = model.evaluate(&input(&model, &[1], &[1])).unwrap();
    let h1 = 1f32.tanh();
    assert!((first.state.rows(0)[0] - h1).abs() < 1e-6);
    let expected = h1 - (1.0 + h1.exp()).ln();
    assert!((first.logprobs[0] - expected).abs() < 1e-5);

    let second = model
        .evaluate(&StepInput {
            prev_word_ids: vec![1],
            prev_class_ids: vec![1],
            target_class_ids: vec![0],
            state: first.state.clone(),
        })
        .unwrap();
    let h2 = (1.0 + 0.5 * h1).tanh();
    assert!((second.state.rows(0)[0] - h2).abs() < 1e-6);
    let expected = -(1.0 + h2.exp()).ln();
    assert!((second.logprobs[0] - expected).abs() < 1e-5);
}

#[test]
fn rows_are_independent() {
    let device = Device::Cpu;
    let model = RnnLm::from_tensors(tanh_config(), tanh_tensors(&device), &device).unwrap();
    let output = model.evaluate(&input(&model, &[0, 1], &[1, 1])).unwrap();
    let rows = output.state.rows(0);
    assert!(rows[0].abs() < 1e-6);
    assert!((rows[1] - 1f32.tanh()).abs() < 1e-6);
    assert!((output.logprobs[0] + 2f32.ln()).abs() < 1e-5);
    assert!(output.logprobs[1] > output.logprobs[0]);
}

#[test]
fn out_of_range_class_is_rejected() {
    let device = Device::Cpu;
    let model = RnnLm::from_tensors(tanh_config(), tanh_tensors(&device), &device).unwrap();
    let err = model.evaluate(&input(&model, &[0], &[7])).unwrap_err();
    assert!(matches!(err, EvaluatorError::Backend(_)));
}

#[test]
fn open_model_directory() {
    let device = Device::Cpu;
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join(CONFIG_FILE),
        r#"{"num_classes": 2, "projection_size": 1, "layers": [{"type": "tanh", "size": 1}]}"#,
    )
    .unwrap();
    candle_core::safetensors::save(&tanh_tensors(&device), dir.path().join(WEIGHTS_FILE))
        .unwrap();

    let model = RnnLm::open(dir.path()).unwrap();
    assert_eq!(model.num_classes(), 2);
    assert_eq!(model.config(), &tanh_config());
    let output = model.evaluate(&input(&model, &[1], &[1])).unwrap();
    assert_eq!(output.logprobs.len(), 1);
}

#[test]
fn open_missing_directory_fails() {
    let dir = tempfile::tempdir().unwrap();
    assert!(RnnLm::open(&dir.path().join("nope")).is_err());
}
