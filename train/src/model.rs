//! The convolutional car classifier.

use crate::{
    common::*,
    config::{ModelConfig, OptimizerConfig},
};
use car_dl::{
    generator::Batch,
    model::{StepOutput, TrainableModel},
};
use derivative::Derivative;

const KERNEL_SIZE: i64 = 5;
const CONV_STRIDE: i64 = 2;

/// The architecture summary saved alongside the weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub architecture: ModelConfig,
    /// The input shape in `[height, width, channels]`.
    pub input_shape: [usize; 3],
    pub num_classes: usize,
    pub num_parameters: usize,
}

/// A single convolution block followed by a two-layer perceptron.
///
/// The input batch is a `[batch, height, width, 3]` uint8 tensor. The output
/// is `[batch, num_classes]` logits.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Classifier {
    #[derivative(Debug = "ignore")]
    vs: nn::VarStore,
    #[derivative(Debug = "ignore")]
    net: nn::SequentialT,
    #[derivative(Debug = "ignore")]
    optimizer: nn::Optimizer,
    clip_value: Option<f64>,
    descriptor: ModelDescriptor,
}

impl Classifier {
    pub fn new(
        device: Device,
        image_width: usize,
        image_height: usize,
        num_classes: usize,
        model: &ModelConfig,
        optimizer: &OptimizerConfig,
    ) -> Result<Self> {
        let ModelConfig {
            conv_channels,
            hidden_units,
            dropout,
        } = *model;
        let OptimizerConfig {
            lr,
            momentum,
            clip_value,
        } = *optimizer;
        ensure!(
            conv_channels > 0 && hidden_units > 0 && num_classes > 0,
            "layer sizes must be positive"
        );
        ensure!(
            (0.0..1.0).contains(&dropout.raw()),
            "dropout must be in range [0, 1), but get {}",
            dropout
        );

        let pooled_height = pooled_size(image_height)?;
        let pooled_width = pooled_size(image_width)?;
        let flat_size = conv_channels as i64 * pooled_height * pooled_width;

        let vs = nn::VarStore::new(device);
        let root = vs.root();
        let dropout = dropout.raw();

        let net = nn::seq_t()
            .add(nn::conv2d(
                &root / "conv",
                3,
                conv_channels as i64,
                KERNEL_SIZE,
                nn::ConvConfig {
                    stride: CONV_STRIDE,
                    ..Default::default()
                },
            ))
            .add_fn(|xs| {
                xs.relu()
                    .max_pool2d(&[2, 2], &[1, 1], &[0, 0], &[1, 1], false)
                    .flatten(1, -1)
            })
            .add(nn::linear(
                &root / "hidden",
                flat_size,
                hidden_units as i64,
                Default::default(),
            ))
            .add_fn(|xs| xs.relu())
            .add_fn_t(move |xs, train| xs.dropout(dropout, train))
            .add(nn::linear(
                &root / "output",
                hidden_units as i64,
                num_classes as i64,
                Default::default(),
            ));

        let optimizer = nn::Sgd {
            momentum: momentum.raw(),
            ..Default::default()
        }
        .build(&vs, lr.raw())?;

        let num_parameters: usize = vs
            .trainable_variables()
            .iter()
            .map(|var| var.size().iter().product::<i64>() as usize)
            .sum();
        info!("classifier has {} trainable parameters", num_parameters);

        Ok(Self {
            vs,
            net,
            optimizer,
            clip_value: clip_value.map(|value| value.raw()),
            descriptor: ModelDescriptor {
                architecture: model.clone(),
                input_shape: [image_height, image_width, 3],
                num_classes,
                num_parameters,
            },
        })
    }

    pub fn descriptor(&self) -> &ModelDescriptor {
        &self.descriptor
    }

    pub fn device(&self) -> Device {
        self.vs.device()
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        self.vs.save(path)?;
        Ok(())
    }

    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.vs.load(path)?;
        Ok(())
    }

    /// Compute logits from a `[batch, height, width, 3]` uint8 image tensor.
    pub fn forward_t(&self, images: &Tensor, train: bool) -> Tensor {
        let xs = images
            .to_device(self.device())
            .permute(&[0, 3, 1, 2])
            .to_kind(Kind::Float)
            / 255.0;
        self.net.forward_t(&xs, train)
    }

    fn targets(&self, labels: &Tensor) -> Tensor {
        labels.to_device(self.device()).argmax(-1, false)
    }
}

impl TrainableModel for Classifier {
    fn train_step(&mut self, batch: &Batch) -> Result<StepOutput> {
        let logits = self.forward_t(&batch.images, true);
        let targets = self.targets(&batch.labels);
        let loss = logits.cross_entropy_for_logits(&targets);

        match self.clip_value {
            Some(clip_value) => self.optimizer.backward_step_clip(&loss, clip_value),
            None => self.optimizer.backward_step(&loss),
        }

        let accuracy = tch::no_grad(|| logits.accuracy_for_logits(&targets));
        step_output(&loss, &accuracy)
    }

    fn evaluate_step(&mut self, batch: &Batch) -> Result<StepOutput> {
        tch::no_grad(|| {
            let logits = self.forward_t(&batch.images, false);
            let targets = self.targets(&batch.labels);
            let loss = logits.cross_entropy_for_logits(&targets);
            let accuracy = logits.accuracy_for_logits(&targets);
            step_output(&loss, &accuracy)
        })
    }
}

/// The spatial size after the strided convolution and the 2x2 pooling.
fn pooled_size(input_size: usize) -> Result<i64> {
    let input_size = input_size as i64;
    ensure!(
        input_size >= KERNEL_SIZE + CONV_STRIDE,
        "image size must be at least {}, but get {}",
        KERNEL_SIZE + CONV_STRIDE,
        input_size
    );
    let conv_size = (input_size - KERNEL_SIZE) / CONV_STRIDE + 1;
    Ok(conv_size - 1)
}

fn step_output(loss: &Tensor, accuracy: &Tensor) -> Result<StepOutput> {
    let loss = R64::try_new(f64::from(loss)).ok_or_else(|| format_err!("the loss is NaN"))?;
    let accuracy = R64::try_new(f64::from(accuracy))
        .ok_or_else(|| format_err!("the accuracy is NaN"))?;
    Ok(StepOutput { loss, accuracy })
}

#[cfg(test)]
mod tests {
    use super::*;
    use car_dl::label::encode;

    fn small_classifier(width: usize, height: usize) -> Result<Classifier> {
        Classifier::new(
            Device::Cpu,
            width,
            height,
            3,
            &ModelConfig {
                conv_channels: 4,
                hidden_units: 8,
                dropout: r64(0.5),
            },
            &OptimizerConfig::default(),
        )
    }

    fn batch(len: usize, width: usize, height: usize) -> Result<Batch> {
        let images = Tensor::zeros(
            &[len as i64, height as i64, width as i64, 3],
            (Kind::Uint8, Device::Cpu),
        );
        let labels: Vec<_> = (0..len)
            .map(|index| encode(index as i64 % 3 + 1, 3))
            .try_collect()?;
        Ok(Batch {
            images,
            labels: Tensor::stack(&labels, 0),
            samples: vec![],
        })
    }

    #[test]
    fn pooled_size_test() -> Result<()> {
        assert_eq!(pooled_size(7)?, 1);
        assert_eq!(pooled_size(8)?, 1);
        assert_eq!(pooled_size(200)?, 97);
        assert!(pooled_size(6).is_err());
        Ok(())
    }

    #[test]
    fn forward_shape() -> Result<()> {
        let model = small_classifier(12, 9)?;
        let logits = model.forward_t(&batch(2, 12, 9)?.images, false);
        assert_eq!(logits.size(), vec![2, 3]);
        assert_eq!(model.descriptor().input_shape, [9, 12, 3]);
        Ok(())
    }

    #[test]
    fn train_and_evaluate_step() -> Result<()> {
        let mut model = small_classifier(8, 8)?;
        let batch = batch(4, 8, 8)?;

        let train = model.train_step(&batch)?;
        let eval = model.evaluate_step(&batch)?;
        for output in [train, eval] {
            assert!(output.loss >= 0.0);
            assert!((0.0..=1.0).contains(&output.accuracy.raw()));
        }
        Ok(())
    }

    #[test]
    fn reject_small_images() {
        assert!(small_classifier(6, 8).is_err());
    }
}
