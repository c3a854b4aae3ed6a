use std::fmt::Debug;

use embedded_graphics::prelude::Size;
use epd_waveshare::{
    epd7in5b_v2::{Epd7in5, HEIGHT, WIDTH},
    prelude::*,
};
use linux_embedded_hal::{
    gpio_cdev::{Chip, LineRequestFlags},
    spidev::{SpiModeFlags, SpidevOptions},
    CdevPin, Delay, SpidevDevice,
};
use tracing::info;

use epaper_dnd_common::BitmapPlane;

use crate::display::{check_size, Display, DisplayError};

const SPI_PATH: &str = "/dev/spidev0.0";
const GPIO_CHIP: &str = "/dev/gpiochip0";

// Waveshare e-Paper HAT wiring (BCM numbering).
const PIN_RST: u32 = 17;
const PIN_DC: u32 = 25;
const PIN_BUSY: u32 = 24;

type Panel = Epd7in5<SpidevDevice, CdevPin, CdevPin, CdevPin, Delay>;

pub struct WaveshareDisplay {
    spi: SpidevDevice,
    delay: Delay,
    epd: Panel,
}

impl WaveshareDisplay {
    pub fn open() -> Result<Self, DisplayError> {
        let mut spi = SpidevDevice::open(SPI_PATH)?;
        let options = SpidevOptions::new()
            .bits_per_word(8)
            .max_speed_hz(4_000_000)
            .mode(SpiModeFlags::SPI_MODE_0)
            .build();
        spi.configure(&options)?;

        let mut chip = Chip::new(GPIO_CHIP).map_err(device_error)?;
        let rst = output_pin(&mut chip, PIN_RST, "epaper-rst")?;
        let dc = output_pin(&mut chip, PIN_DC, "epaper-dc")?;
        let busy_handle = chip
            .get_line(PIN_BUSY)
            .and_then(|line| line.request(LineRequestFlags::INPUT, 0, "epaper-busy"))
            .map_err(device_error)?;
        let busy = CdevPin::new(busy_handle).map_err(device_error)?;

        let mut delay = Delay {};
        let epd = Epd7in5::new(&mut spi, busy, dc, rst, &mut delay, None).map_err(device_error)?;
        info!("waveshare 7.5in b/w/r panel opened on {SPI_PATH}");

        Ok(Self { spi, delay, epd })
    }
}

impl Display for WaveshareDisplay {
    fn name(&self) -> &'static str {
        "waveshare-7in5b-v2"
    }

    fn size(&self) -> Size {
        Size::new(WIDTH, HEIGHT)
    }

    fn initialize(&mut self) -> Result<(), DisplayError> {
        self.epd
            .wake_up(&mut self.spi, &mut self.delay)
            .map_err(device_error)
    }

    fn clear(&mut self) -> Result<(), DisplayError> {
        self.epd
            .clear_frame(&mut self.spi, &mut self.delay)
            .and_then(|()| self.epd.display_frame(&mut self.spi, &mut self.delay))
            .map_err(device_error)
    }

    fn show_frame(
        &mut self,
        primary: &BitmapPlane,
        accent: &BitmapPlane,
    ) -> Result<(), DisplayError> {
        check_size(self.size(), primary)?;
        check_size(self.size(), accent)?;

        // Panel RAM uses 1 for ink on both planes.
        let black = inverted(primary);
        let red = inverted(accent);

        self.epd
            .update_color_frame(&mut self.spi, &mut self.delay, &black, &red)
            .and_then(|()| self.epd.display_frame(&mut self.spi, &mut self.delay))
            .map_err(device_error)
    }

    fn sleep(&mut self) -> Result<(), DisplayError> {
        self.epd
            .sleep(&mut self.spi, &mut self.delay)
            .map_err(device_error)
    }
}

fn output_pin(chip: &mut Chip, offset: u32, consumer: &str) -> Result<CdevPin, DisplayError> {
    let handle = chip
        .get_line(offset)
        .and_then(|line| line.request(LineRequestFlags::OUTPUT, 0, consumer))
        .map_err(device_error)?;
    CdevPin::new(handle).map_err(device_error)
}

fn inverted(plane: &BitmapPlane) -> Vec<u8> {
    plane.as_bytes().iter().map(|byte| !byte).collect()
}

fn device_error(err: impl Debug) -> DisplayError {
    DisplayError::Device(format!("{err:?}"))
}
