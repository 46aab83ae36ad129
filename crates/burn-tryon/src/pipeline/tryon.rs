//! Virtual try-on pipeline

use burn::prelude::*;
use burn_tryon_image::{CanonicalImages, ConditionedTensors, Garment, tensor_to_images};
use burn_tryon_samplers::{
    DdimConfig, DdimScheduler, EulerConfig, EulerScheduler, NoiseGenerator, NoiseSchedule,
    Scheduler, apply_guidance, expand_for_guidance, guidance_enabled, split_guidance_batch,
};
use burn_tryon_vae::{
    LatentDecoder, LatentEncoder, PooledCodec, decode_scaled, decode_to_unit_range, mask_image,
};
use image::{DynamicImage, RgbImage};
use tracing::{debug, info, warn};

use super::{
    InferenceState, SchedulerKind, StepInfo, StepOutput, TryOnConfig, check_tensor_if,
    tensor_stats,
};
use crate::compositor::{LatentComposite, downsample_mask_nearest, split_person_half};
use crate::denoiser::{Denoiser, PassthroughDenoiser};
use crate::error::TryOnError;
use crate::safety::{Placeholder, SafetyChecker, apply_safety_filter};

/// Try-on pipeline
///
/// Holds the pretrained units and the training noise schedule. Built once and
/// reused for every call; each call owns its latents and noise generator.
pub struct TryOnPipeline<B: Backend> {
    encoder: Box<dyn LatentEncoder<B>>,
    decoder: Box<dyn LatentDecoder<B>>,
    denoiser: Box<dyn Denoiser<B>>,
    safety_checker: Option<Box<dyn SafetyChecker>>,
    placeholder: Placeholder,
    schedule: NoiseSchedule,
    device: B::Device,
}

impl<B: Backend> TryOnPipeline<B> {
    /// Create a pipeline from pretrained units with the SD inpainting schedule
    pub fn new(
        encoder: impl LatentEncoder<B> + 'static,
        decoder: impl LatentDecoder<B> + 'static,
        denoiser: impl Denoiser<B> + 'static,
        device: &B::Device,
    ) -> Self {
        Self {
            encoder: Box::new(encoder),
            decoder: Box::new(decoder),
            denoiser: Box::new(denoiser),
            safety_checker: None,
            placeholder: Placeholder::default(),
            schedule: NoiseSchedule::sd_inpainting(),
            device: device.clone(),
        }
    }

    /// Parameter-free pipeline: pooled codec and passthrough denoiser
    ///
    /// Produces the masked person back (with residual noise); useful for
    /// exercising the full loop without weights.
    pub fn reference(device: &B::Device) -> Self {
        let schedule = NoiseSchedule::sd_inpainting();
        Self::new(
            PooledCodec::default(),
            PooledCodec::default(),
            PassthroughDenoiser::new(schedule),
            device,
        )
    }

    /// Replace the training noise schedule
    pub fn with_schedule(mut self, schedule: NoiseSchedule) -> Self {
        self.schedule = schedule;
        self
    }

    /// Install a safety checker; used when `TryOnConfig::safety_check` is set
    pub fn with_safety_checker(
        mut self,
        checker: impl SafetyChecker + 'static,
        placeholder: Placeholder,
    ) -> Self {
        self.safety_checker = Some(Box::new(checker));
        self.placeholder = placeholder;
        self
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    pub fn schedule(&self) -> &NoiseSchedule {
        &self.schedule
    }

    /// Crop, pad and stack inputs to the canonical resolution
    pub fn prepare(
        &self,
        person: &DynamicImage,
        garment: Garment,
        mask: &DynamicImage,
        config: &TryOnConfig,
    ) -> Result<CanonicalImages, TryOnError> {
        config.validate(self.encoder.downscale_factor())?;
        Ok(CanonicalImages::prepare(
            person,
            garment,
            mask,
            config.width as u32,
            config.height as u32,
        )?)
    }

    /// Encode conditioning tensors into the composite latents
    pub fn encode(
        &self,
        tensors: &ConditionedTensors<B>,
    ) -> Result<LatentComposite<B>, TryOnError> {
        let [_, _, h, w] = tensors.dims();
        let factor = self.encoder.downscale_factor();
        if h % factor != 0 || w % factor != 0 {
            return Err(TryOnError::InvalidConfig(format!(
                "input {}x{} is not a multiple of the latent downscale {}",
                w, h, factor
            )));
        }

        let masked_image = mask_image(tensors.person().clone(), tensors.mask().clone());
        let masked_latent = self.encoder.encode(masked_image);
        let garment_latent = self.encoder.encode(tensors.garment().clone());

        let [b, c, lh, lw] = masked_latent.dims();
        let expected = [b, self.encoder.latent_channels(), h / factor, w / factor];
        if [b, c, lh, lw] != expected {
            return Err(TryOnError::ShapeMismatch {
                name: "masked_latent",
                expected: expected.to_vec(),
                actual: vec![b, c, lh, lw],
            });
        }

        let mask_latent = downsample_mask_nearest(tensors.mask().clone(), lh, lw);
        LatentComposite::new(masked_latent, garment_latent, mask_latent)
    }

    fn build_scheduler(&self, config: &TryOnConfig) -> Result<Box<dyn Scheduler<B>>, TryOnError> {
        Ok(match config.scheduler {
            SchedulerKind::Ddim => Box::new(DdimScheduler::new(
                &self.schedule,
                DdimConfig {
                    num_inference_steps: config.steps,
                    eta: config.eta,
                },
            )?),
            SchedulerKind::Euler => Box::new(EulerScheduler::new(
                &self.schedule,
                EulerConfig {
                    num_inference_steps: config.steps,
                },
            )?),
        })
    }

    /// Run the denoising loop to completion
    pub fn sample_latent(
        &self,
        composite: &LatentComposite<B>,
        config: &TryOnConfig,
        noise: &mut NoiseGenerator,
    ) -> Result<Tensor<B, 4>, TryOnError> {
        self.sample_latent_with_callback(composite, config, noise, StepOutput::None, |_| {})
    }

    /// Run the denoising loop with a step callback for progress reporting
    ///
    /// The callback is called after each step with step info and optional output.
    /// Use `StepOutput::None` for minimal overhead.
    pub fn sample_latent_with_callback<F>(
        &self,
        composite: &LatentComposite<B>,
        config: &TryOnConfig,
        noise: &mut NoiseGenerator,
        step_output: StepOutput,
        callback: F,
    ) -> Result<Tensor<B, 4>, TryOnError>
    where
        F: FnMut(StepInfo<B>),
    {
        self.run_loop(composite, config, noise, step_output, callback)
            .map(|(latent, _)| latent)
    }

    fn run_loop<F>(
        &self,
        composite: &LatentComposite<B>,
        config: &TryOnConfig,
        noise: &mut NoiseGenerator,
        step_output: StepOutput,
        mut callback: F,
    ) -> Result<(Tensor<B, 4>, InferenceState), TryOnError>
    where
        F: FnMut(StepInfo<B>),
    {
        let debug_sampler = config.debug.sampler;
        let debug_nan = config.debug.nan;
        let guidance = guidance_enabled(config.guidance_scale);

        let scheduler = self.build_scheduler(config)?;
        let total_steps = scheduler.num_steps();
        let mut state = InferenceState::NotStarted.transition(InferenceState::Running {
            step: 0,
            total: total_steps,
        })?;

        let (mask_cond, masked_cond) = composite.denoiser_conditioning(guidance);
        let latent_shape = composite.latent_shape();
        let mut expected_pred = latent_shape;
        if guidance {
            expected_pred[0] *= 2;
        }

        let mut latent =
            noise.normal::<B, 4>(latent_shape, &self.device) * scheduler.init_noise_sigma();

        if debug_sampler {
            debug!(
                "{:?} scheduler, {} steps, guidance {}",
                config.scheduler, total_steps, config.guidance_scale
            );
            debug!("Initial latent: {}", tensor_stats(&latent));
        }

        // Timestep tensors are built once, before the loop
        let timesteps = scheduler.timesteps().to_vec();
        let timestep_tensors: Vec<Tensor<B, 1>> = timesteps
            .iter()
            .map(|&t| Tensor::<B, 1>::from_data(TensorData::new(vec![t as f32], [1]), &self.device))
            .collect();

        for step_idx in 0..total_steps {
            let model_latent = if guidance {
                expand_for_guidance(latent.clone())
            } else {
                latent.clone()
            };
            let model_latent = scheduler.scale_model_input(model_latent, step_idx);
            let input = Tensor::cat(vec![model_latent, mask_cond.clone(), masked_cond.clone()], 1);

            let noise_pred = self
                .denoiser
                .forward(input, timestep_tensors[step_idx].clone());
            if noise_pred.dims() != expected_pred {
                return Err(TryOnError::DenoiserOutput {
                    expected: expected_pred.to_vec(),
                    actual: noise_pred.dims().to_vec(),
                });
            }
            check_tensor_if(&noise_pred, &format!("step_{}_noise_pred", step_idx), debug_nan)?;

            let noise_pred = if guidance {
                let (noise_uncond, noise_cond) = split_guidance_batch(noise_pred);
                apply_guidance(noise_uncond, noise_cond, config.guidance_scale)
            } else {
                noise_pred
            };

            latent = scheduler.step(noise_pred, step_idx, latent, noise)?;
            check_tensor_if(&latent, &format!("step_{}_latent", step_idx), debug_nan)?;
            state = state.complete_step()?;

            if debug_sampler {
                debug!(
                    "Step {} (t={}) - latent: {}",
                    step_idx,
                    timesteps[step_idx],
                    tensor_stats(&latent)
                );
            }

            let output = match step_output {
                StepOutput::None => None,
                StepOutput::Latent => Some(latent.clone()),
                StepOutput::Decoded => Some(self.decode_tensor(latent.clone())?),
            };
            callback(StepInfo {
                step: step_idx,
                total_steps,
                timestep: timesteps[step_idx],
                state,
                output,
            });
        }

        if debug_sampler {
            debug!("Final latent: {}", tensor_stats(&latent));
        }

        Ok((latent, state))
    }

    /// Person half of a composite latent decoded to [0, 1]
    fn decode_tensor(&self, latent: Tensor<B, 4>) -> Result<Tensor<B, 4>, TryOnError> {
        let person = split_person_half(latent)?;
        Ok(decode_to_unit_range(decode_scaled(
            self.decoder.as_ref(),
            person,
        )))
    }

    /// Decode the final composite latent to images, applying the safety filter
    pub fn decode(
        &self,
        latent: Tensor<B, 4>,
        config: &TryOnConfig,
    ) -> Result<Vec<RgbImage>, TryOnError> {
        let debug_nan = config.debug.nan;
        check_tensor_if(&latent, "decoder_input_latent", debug_nan)?;

        let image = self.decode_tensor(latent)?;
        check_tensor_if(&image, "decoder_output", debug_nan)?;
        if config.debug.sampler {
            debug!("Decoder output: {}", tensor_stats(&image));
        }

        let images = tensor_to_images(image)?;
        let checker = if config.safety_check {
            if self.safety_checker.is_none() {
                warn!("Safety check requested but no checker installed");
            }
            self.safety_checker.as_deref()
        } else {
            None
        };
        let (images, flags) = apply_safety_filter(images, checker, &self.placeholder);
        let flagged = flags.iter().filter(|&&f| f).count();
        if flagged > 0 {
            warn!("{} image(s) flagged by the safety checker, replaced", flagged);
        }
        Ok(images)
    }

    /// Full pipeline: images -> try-on image
    pub fn generate(
        &self,
        person: &DynamicImage,
        garment: Garment,
        mask: &DynamicImage,
        config: &TryOnConfig,
    ) -> Result<RgbImage, TryOnError> {
        self.generate_with_callback(person, garment, mask, config, StepOutput::None, |_| {})
    }

    /// Full pipeline with a step callback
    pub fn generate_with_callback<F>(
        &self,
        person: &DynamicImage,
        garment: Garment,
        mask: &DynamicImage,
        config: &TryOnConfig,
        step_output: StepOutput,
        callback: F,
    ) -> Result<RgbImage, TryOnError>
    where
        F: FnMut(StepInfo<B>),
    {
        let canonical = self.prepare(person, garment, mask, config)?;
        let tensors = canonical.to_tensors::<B>(&self.device);
        let mut images =
            self.generate_from_tensors_with_callback(&tensors, config, step_output, callback)?;
        images.pop().ok_or(TryOnError::ShapeMismatch {
            name: "output",
            expected: vec![1],
            actual: vec![0],
        })
    }

    /// Pipeline from pre-converted tensors, one image per batch element
    pub fn generate_from_tensors(
        &self,
        tensors: &ConditionedTensors<B>,
        config: &TryOnConfig,
    ) -> Result<Vec<RgbImage>, TryOnError> {
        self.generate_from_tensors_with_callback(tensors, config, StepOutput::None, |_| {})
    }

    /// Pipeline from pre-converted tensors with a step callback
    pub fn generate_from_tensors_with_callback<F>(
        &self,
        tensors: &ConditionedTensors<B>,
        config: &TryOnConfig,
        step_output: StepOutput,
        callback: F,
    ) -> Result<Vec<RgbImage>, TryOnError>
    where
        F: FnMut(StepInfo<B>),
    {
        config.validate(self.encoder.downscale_factor())?;
        let [b, _, h, w] = tensors.dims();
        if (h, w) != (config.height, config.width) {
            return Err(TryOnError::ShapeMismatch {
                name: "person",
                expected: vec![b, 3, config.height, config.width],
                actual: vec![b, 3, h, w],
            });
        }

        info!(
            "Try-on {}x{}: {} steps, guidance {}, {:?}, seed {:?}",
            config.width,
            config.height,
            config.steps,
            config.guidance_scale,
            config.scheduler,
            config.seed
        );

        let mut noise = NoiseGenerator::new(config.seed);
        let composite = self.encode(tensors)?;
        let (latent, state) = self.run_loop(&composite, config, &mut noise, step_output, callback)?;

        let state = state.transition(InferenceState::Decoding)?;
        let images = self.decode(latent, config)?;
        state.transition(InferenceState::Done)?;
        Ok(images)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use image::{GrayImage, Luma, Rgb};

    type TestBackend = NdArray<f32>;

    fn small_config() -> TryOnConfig {
        TryOnConfig::default()
            .with_size(32, 48)
            .with_steps(3)
            .with_seed(42)
    }

    fn tensors(device: &<TestBackend as Backend>::Device) -> ConditionedTensors<TestBackend> {
        let mask = GrayImage::from_fn(32, 48, |x, _| Luma([if x >= 16 { 255 } else { 0 }]));
        CanonicalImages {
            person: RgbImage::from_pixel(32, 48, Rgb([200, 60, 60])),
            garment: RgbImage::from_pixel(32, 48, Rgb([20, 20, 220])),
            mask,
        }
        .to_tensors(device)
    }

    #[test]
    fn test_encode_shapes() {
        let device = Default::default();
        let pipeline = TryOnPipeline::<TestBackend>::reference(&device);
        let composite = pipeline.encode(&tensors(&device)).unwrap();
        assert_eq!(composite.latent_shape(), [1, 4, 12, 4]);
        assert_eq!(composite.person_height(), 6);
    }

    #[test]
    fn test_denoiser_receives_nine_channels() {
        let device = Default::default();
        let denoiser = |input: Tensor<TestBackend, 4>, _t: Tensor<TestBackend, 1>| {
            let [b, c, h, w] = input.dims();
            assert_eq!(c, 9);
            // Batch doubled for guidance
            assert_eq!(b, 2);
            Tensor::<TestBackend, 4>::zeros([b, 4, h, w], &input.device())
        };
        let pipeline = TryOnPipeline::new(
            PooledCodec::default(),
            PooledCodec::default(),
            denoiser,
            &device,
        );
        let images = pipeline
            .generate_from_tensors(&tensors(&device), &small_config())
            .unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].dimensions(), (32, 48));
    }

    #[test]
    fn test_unguided_batch() {
        let device = Default::default();
        let denoiser = |input: Tensor<TestBackend, 4>, _t: Tensor<TestBackend, 1>| {
            let [b, _, h, w] = input.dims();
            assert_eq!(b, 1);
            Tensor::<TestBackend, 4>::zeros([b, 4, h, w], &input.device())
        };
        let pipeline = TryOnPipeline::new(
            PooledCodec::default(),
            PooledCodec::default(),
            denoiser,
            &device,
        );
        let config = small_config().with_guidance_scale(1.0);
        assert!(pipeline.generate_from_tensors(&tensors(&device), &config).is_ok());
    }

    #[test]
    fn test_wrong_denoiser_output_is_an_error() {
        let device = Default::default();
        let denoiser = |input: Tensor<TestBackend, 4>, _t: Tensor<TestBackend, 1>| {
            let [_, _, h, w] = input.dims();
            // Drops the guidance batch
            Tensor::<TestBackend, 4>::zeros([1, 4, h, w], &input.device())
        };
        let pipeline = TryOnPipeline::new(
            PooledCodec::default(),
            PooledCodec::default(),
            denoiser,
            &device,
        );
        let result = pipeline.generate_from_tensors(&tensors(&device), &small_config());
        assert!(matches!(
            result,
            Err(TryOnError::DenoiserOutput { expected, actual })
                if expected == vec![2, 4, 12, 4] && actual == vec![1, 4, 12, 4]
        ));
    }

    #[test]
    fn test_callback_sees_every_step() {
        let device = Default::default();
        let pipeline = TryOnPipeline::<TestBackend>::reference(&device);
        let composite = pipeline.encode(&tensors(&device)).unwrap();
        let mut seen = Vec::new();
        let mut noise = NoiseGenerator::from_seed(1);
        pipeline
            .sample_latent_with_callback(
                &composite,
                &small_config(),
                &mut noise,
                StepOutput::Decoded,
                |info| {
                    let dims = info.output.as_ref().map(|t| t.dims());
                    assert_eq!(dims, Some([1, 3, 48, 32]));
                    seen.push((info.step, info.timestep, info.state));
                },
            )
            .unwrap();
        assert_eq!(
            seen,
            vec![
                (0, 667, InferenceState::Running { step: 1, total: 3 }),
                (1, 334, InferenceState::Running { step: 2, total: 3 }),
                (2, 1, InferenceState::Running { step: 3, total: 3 }),
            ]
        );
    }

    #[test]
    fn test_seeded_latents_identical_every_step() {
        let device = Default::default();
        let pipeline = TryOnPipeline::<TestBackend>::reference(&device);
        let composite = pipeline.encode(&tensors(&device)).unwrap();

        let record = || {
            let mut latents = Vec::new();
            let mut noise = NoiseGenerator::from_seed(7);
            pipeline
                .sample_latent_with_callback(
                    &composite,
                    &small_config(),
                    &mut noise,
                    StepOutput::Latent,
                    |info| {
                        let latent = info.output.expect("latent requested");
                        latents.push(latent.into_data().to_vec::<f32>().unwrap());
                    },
                )
                .unwrap();
            latents
        };

        let first = record();
        assert_eq!(first.len(), 3);
        assert_eq!(first, record());
        // Steps actually move the latent
        assert_ne!(first[0], first[2]);
    }

    #[test]
    fn test_soft_mask_tensor_reaches_denoiser_binary() {
        let device = Default::default();
        let soft = ConditionedTensors::<TestBackend>::new(
            Tensor::full([1, 3, 32, 32], 0.2, &device),
            Tensor::full([1, 3, 32, 32], -0.4, &device),
            Tensor::full([1, 1, 32, 32], 0.7, &device),
        )
        .unwrap();
        let pipeline = TryOnPipeline::<TestBackend>::reference(&device);
        let composite = pipeline.encode(&soft).unwrap();
        let values = composite
            .mask_latent_concat()
            .clone()
            .into_data()
            .to_vec::<f32>()
            .unwrap();
        assert!(values.iter().all(|&v| v == 0.0 || v == 1.0), "{:?}", values);
        assert!(values.contains(&1.0));
    }

    #[test]
    fn test_nan_check_fails_call() {
        let device = Default::default();
        let denoiser = |input: Tensor<TestBackend, 4>, _t: Tensor<TestBackend, 1>| {
            let [b, _, h, w] = input.dims();
            Tensor::<TestBackend, 4>::full([b, 4, h, w], f32::NAN, &input.device())
        };
        let pipeline = TryOnPipeline::new(
            PooledCodec::default(),
            PooledCodec::default(),
            denoiser,
            &device,
        );
        let mut config = small_config();
        config.debug.nan = true;
        assert!(matches!(
            pipeline.generate_from_tensors(&tensors(&device), &config),
            Err(TryOnError::NonFinite { .. })
        ));
    }

    #[test]
    fn test_config_resolution_must_match_tensors() {
        let device = Default::default();
        let pipeline = TryOnPipeline::<TestBackend>::reference(&device);
        let config = small_config().with_size(64, 48);
        assert!(matches!(
            pipeline.generate_from_tensors(&tensors(&device), &config),
            Err(TryOnError::ShapeMismatch { name: "person", .. })
        ));
    }

    #[test]
    fn test_safety_filter_replaces_output() {
        let device = Default::default();
        let pipeline = TryOnPipeline::<TestBackend>::reference(&device)
            .with_safety_checker(|_: &RgbImage| true, Placeholder::Solid(Rgb([0, 255, 0])));
        let mut config = small_config();
        config.safety_check = true;
        let images = pipeline.generate_from_tensors(&tensors(&device), &config).unwrap();
        assert!(images[0].pixels().all(|p| *p == Rgb([0, 255, 0])));

        // Installed but disabled: output untouched
        config.safety_check = false;
        let images = pipeline.generate_from_tensors(&tensors(&device), &config).unwrap();
        assert!(images[0].pixels().any(|p| *p != Rgb([0, 255, 0])));
    }
}
