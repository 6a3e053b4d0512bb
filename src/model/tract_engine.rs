// 该文件是 Chepai （车牌锚点） 项目的一部分。
// src/model/tract_engine.rs - 基于 tract 的 ONNX 推理引擎
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::path::PathBuf;

use thiserror::Error;
use tract_onnx::prelude::*;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::InputBuffer,
  model::{InferenceEngine, RawOutput},
  url_file_path,
};

type OnnxPlan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

#[derive(Error, Debug)]
pub enum TractEngineError {
  #[error("URI 方案不匹配: 期望 '{expected}', 实际 '{actual}'")]
  SchemeMismatch {
    expected: &'static str,
    actual: String,
  },
  #[error("模型文件不存在: {0}")]
  ModelMissing(PathBuf),
  #[error("模型加载失败: {0}")]
  ModelLoad(TractError),
  #[error("输入张量构造失败: {0}")]
  Input(TractError),
  #[error("推理失败: {0}")]
  Inference(TractError),
  #[error("模型没有输出")]
  NoOutput,
  #[error("模型输出不是 f32 张量: {0}")]
  OutputType(TractError),
  #[error("推理引擎已释放")]
  Disposed,
}

pub struct TractEngineBuilder {
  model_path: PathBuf,
  input_width: usize,
  input_height: usize,
}

impl FromUrlWithScheme for TractEngineBuilder {
  const SCHEME: &'static str = "tract";
}

impl FromUrl for TractEngineBuilder {
  type Error = TractEngineError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(TractEngineError::SchemeMismatch {
        expected: Self::SCHEME,
        actual: url.scheme().to_string(),
      });
    }

    Ok(TractEngineBuilder {
      model_path: url_file_path(url),
      input_width: 640,
      input_height: 640,
    })
  }
}

impl TractEngineBuilder {
  pub fn input_size(mut self, width: usize, height: usize) -> Self {
    self.input_width = width;
    self.input_height = height;
    self
  }

  pub fn build(self) -> Result<TractEngine, TractEngineError> {
    if !self.model_path.is_file() {
      return Err(TractEngineError::ModelMissing(self.model_path));
    }

    info!("加载模型文件: {}", self.model_path.display());
    let model = tract_onnx::onnx()
      .model_for_path(&self.model_path)
      .and_then(|model| {
        model.with_input_fact(
          0,
          InferenceFact::dt_shape(
            f32::datum_type(),
            tvec!(1, 3, self.input_height, self.input_width),
          ),
        )
      })
      .and_then(|model| model.into_optimized())
      .and_then(|model| model.into_runnable())
      .map_err(TractEngineError::ModelLoad)?;
    info!(
      "模型加载完成，输入尺寸 {}x{}",
      self.input_width, self.input_height
    );

    Ok(TractEngine { model: Some(model) })
  }
}

/// tract 推理引擎，执行 [1, 3, H, W] 的 f32 输入
pub struct TractEngine {
  model: Option<OnnxPlan>,
}

impl InferenceEngine for TractEngine {
  type Error = TractEngineError;

  fn execute(&mut self, input: &InputBuffer) -> Result<RawOutput, Self::Error> {
    let model = self.model.as_ref().ok_or(TractEngineError::Disposed)?;

    let tensor =
      Tensor::from_shape(&input.shape(), input.as_slice()).map_err(TractEngineError::Input)?;

    debug!("执行模型推理");
    let outputs = model
      .run(tvec!(tensor.into()))
      .map_err(TractEngineError::Inference)?;

    let output = outputs.first().ok_or(TractEngineError::NoOutput)?;
    let view = output
      .to_array_view::<f32>()
      .map_err(TractEngineError::OutputType)?;
    debug!("模型输出形状: {:?}", view.shape());

    Ok(RawOutput::from(view.iter().copied().collect::<Vec<f32>>()))
  }

  fn dispose(&mut self) {
    if self.model.take().is_some() {
      info!("推理引擎已释放");
    }
  }
}
