use anyhow::{bail, Result};
use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig},
        loss::BinaryCrossEntropyLossConfig,
        pool::{MaxPool2d, MaxPool2dConfig},
        PaddingConfig2d,
    },
    prelude::*,
    tensor::activation::relu,
};

/// Three 2x2 poolings: inputs must divide by 8.
pub const DOWNSAMPLE_FACTOR: usize = 8;

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize
#[derive(Config, Debug)]
pub struct UNetConfig {
    #[config(default = 1)]
    pub in_channels: usize,
    /// Width of the first encoder block; deeper blocks double it.
    #[config(default = 64)]
    pub base_channels: usize,
}

impl UNetConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> UNet<B> {
        let c = self.base_channels;
        UNet {
            down1: DoubleConv::new(self.in_channels, c, device),
            down2: DoubleConv::new(c, 2 * c, device),
            down3: DoubleConv::new(2 * c, 4 * c, device),
            down4: DoubleConv::new(4 * c, 8 * c, device),
            up_conv1: up_conv(8 * c, 4 * c, device),
            up1:   DoubleConv::new(8 * c, 4 * c, device),
            up_conv2: up_conv(4 * c, 2 * c, device),
            up2:   DoubleConv::new(4 * c, 2 * c, device),
            up_conv3: up_conv(2 * c, c, device),
            up3:   DoubleConv::new(2 * c, c, device),
            head:  Conv2dConfig::new([c, 1], [1, 1]).init(device),
            pool:  MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
        }
    }
}

/// 2x2 transposed conv with stride 2: doubles H and W, sets the channel count.
fn up_conv<B: Backend>(in_channels: usize, out_channels: usize, device: &B::Device) -> ConvTranspose2d<B> {
    ConvTranspose2dConfig::new([in_channels, out_channels], [2, 2])
        .with_stride([2, 2])
        .init(device)
}

/// conv 3x3 → ReLU → conv 3x3 → ReLU, spatial size preserved.
#[derive(Module, Debug)]
pub struct DoubleConv<B: Backend> {
    pub conv1: Conv2d<B>,
    pub conv2: Conv2d<B>,
}

impl<B: Backend> DoubleConv<B> {
    fn new(in_channels: usize, out_channels: usize, device: &B::Device) -> Self {
        let conv = |c_in: usize, c_out: usize| -> Conv2d<B> {
            Conv2dConfig::new([c_in, c_out], [3, 3])
                .with_padding(PaddingConfig2d::Same)
                .init(device)
        };
        Self {
            conv1: conv(in_channels, out_channels),
            conv2: conv(out_channels, out_channels),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = relu(self.conv1.forward(x));
        relu(self.conv2.forward(x))
    }
}

#[derive(Module, Debug)]
pub struct UNet<B: Backend> {
    pub down1: DoubleConv<B>,
    pub down2: DoubleConv<B>,
    pub down3: DoubleConv<B>,
    pub down4: DoubleConv<B>,
    pub up_conv1: ConvTranspose2d<B>,
    pub up1:   DoubleConv<B>,
    pub up_conv2: ConvTranspose2d<B>,
    pub up2:   DoubleConv<B>,
    pub up_conv3: ConvTranspose2d<B>,
    pub up3:   DoubleConv<B>,
    pub head:  Conv2d<B>,
    pub pool:  MaxPool2d,
}

impl<B: Backend> UNet<B> {
    /// images: [batch, 1, H, W] → logits: [batch, 1, H, W]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 4> {
        let x1 = self.down1.forward(images);
        let x2 = self.down2.forward(self.pool.forward(x1.clone()));
        let x3 = self.down3.forward(self.pool.forward(x2.clone()));
        let x4 = self.down4.forward(self.pool.forward(x3.clone()));

        // Up-conv, then concatenate with the skip connection on channels
        let x = self.up1.forward(Tensor::cat(vec![self.up_conv1.forward(x4), x3], 1));
        let x = self.up2.forward(Tensor::cat(vec![self.up_conv2.forward(x), x2], 1));
        let x = self.up3.forward(Tensor::cat(vec![self.up_conv3.forward(x), x1], 1));

        self.head.forward(x)
    }

    /// Binary cross-entropy on logits. Returns (loss, logits).
    pub fn forward_loss(
        &self,
        images: Tensor<B, 4>,
        masks:  Tensor<B, 4, Int>,
    ) -> (Tensor<B, 1>, Tensor<B, 4>) {
        let logits = self.forward(images);
        let [batch, _, height, width] = logits.dims();

        let bce = BinaryCrossEntropyLossConfig::new()
            .with_logits(true)
            .init(&logits.device());
        let loss = bce.forward(
            logits.clone().reshape([batch, height * width]),
            masks.reshape([batch, height * width]),
        );
        (loss, logits)
    }

    /// Sigmoid probabilities in [0, 1].
    pub fn probabilities(&self, images: Tensor<B, 4>) -> Tensor<B, 4> {
        burn::tensor::activation::sigmoid(self.forward(images))
    }
}

/// Reject slice sizes the encoder/decoder cannot round-trip.
pub fn check_input_size(height: usize, width: usize) -> Result<()> {
    if height == 0 || width == 0
        || height % DOWNSAMPLE_FACTOR != 0
        || width % DOWNSAMPLE_FACTOR != 0
    {
        bail!(
            "U-Net input {}x{} must be non-empty and divisible by {}",
            height, width, DOWNSAMPLE_FACTOR
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{ndarray::NdArrayDevice, NdArray};

    type TestBackend = NdArray;

    #[test]
    fn test_output_matches_input_size() {
        let device = NdArrayDevice::default();
        let model: UNet<TestBackend> = UNetConfig::new().with_base_channels(4).init(&device);

        let images = Tensor::<TestBackend, 4>::zeros([2, 1, 16, 24], &device);
        let logits = model.forward(images);
        assert_eq!(logits.dims(), [2, 1, 16, 24]);
    }

    #[test]
    fn test_probabilities_in_unit_range() {
        let device = NdArrayDevice::default();
        let model: UNet<TestBackend> = UNetConfig::new().with_base_channels(2).init(&device);

        let images = Tensor::<TestBackend, 4>::ones([1, 1, 8, 8], &device);
        let probs = model.probabilities(images).into_data().to_vec::<f32>().unwrap();
        assert!(probs.iter().all(|&p| (0.0..=1.0).contains(&p)));
    }

    #[test]
    fn test_loss_is_finite_scalar() {
        let device = NdArrayDevice::default();
        let model: UNet<TestBackend> = UNetConfig::new().with_base_channels(2).init(&device);

        let images = Tensor::<TestBackend, 4>::zeros([1, 1, 8, 8], &device);
        let masks  = Tensor::<TestBackend, 4, Int>::zeros([1, 1, 8, 8], &device);
        let (loss, _) = model.forward_loss(images, masks);
        let value: f64 = loss.into_scalar().elem::<f64>();
        assert!(value.is_finite() && value > 0.0);
    }

    #[test]
    fn test_backward_on_cpu_backend() {
        type TrainBackend = burn::backend::Autodiff<NdArray>;
        let device = NdArrayDevice::default();
        let model: UNet<TrainBackend> = UNetConfig::new().with_base_channels(2).init(&device);

        let images = Tensor::<TrainBackend, 4>::ones([2, 1, 8, 8], &device);
        let masks  = Tensor::<TrainBackend, 4, Int>::ones([2, 1, 8, 8], &device);
        let (loss, _) = model.forward_loss(images, masks);
        let grads = loss.backward();

        let head_grad = model.head.weight.val().grad(&grads).unwrap();
        assert_eq!(head_grad.dims(), [1, 2, 1, 1]);
        let up_grad = model.up_conv1.weight.val().grad(&grads).unwrap();
        assert_eq!(&up_grad.dims()[..2], &[16, 8]);
    }

    #[test]
    fn test_input_size_check() {
        assert!(check_input_size(256, 256).is_ok());
        assert!(check_input_size(250, 256).is_err());
        assert!(check_input_size(0, 8).is_err());
    }
}
