//! Raspberry Pi backend: GPIO actuator/indicator and an MCP3008 ADC on SPI0.

use rppal::gpio::{Gpio, OutputPin};
use rppal::spi::{Bus, Mode, SlaveSelect, Spi};
use tempo_traits::{Actuator, AnalogInput};

use crate::error::{HwError, Result};
use crate::pin::{GuardedPin, PinWrite};

impl PinWrite for OutputPin {
    fn write(&mut self, high: bool) {
        if high {
            self.set_high();
        } else {
            self.set_low();
        }
    }
}

/// Actuation output, its indicator and an optional session LED.
pub struct GpioActuator {
    output: GuardedPin<OutputPin>,
    indicator: GuardedPin<OutputPin>,
    session: Option<GuardedPin<OutputPin>>,
}

fn output_pin(gpio: &Gpio, pin: u8) -> Result<GuardedPin<OutputPin>> {
    let out = gpio
        .get(pin)
        .map_err(|e| HwError::Gpio(e.to_string()))?
        .into_output_low();
    Ok(GuardedPin::new(out))
}

impl GpioActuator {
    pub fn new(actuator_pin: u8, indicator_pin: u8, session_pin: Option<u8>) -> Result<Self> {
        let gpio = Gpio::new().map_err(|e| HwError::Gpio(e.to_string()))?;
        let output = output_pin(&gpio, actuator_pin)?;
        let indicator = output_pin(&gpio, indicator_pin)?;
        let session = session_pin.map(|p| output_pin(&gpio, p)).transpose()?;
        tracing::info!(actuator_pin, indicator_pin, ?session_pin, "gpio actuator ready");
        Ok(Self {
            output,
            indicator,
            session,
        })
    }
}

impl Actuator for GpioActuator {
    fn set_output(&self, high: bool) {
        self.output.write(high);
    }

    fn set_indicator(&self, on: bool) {
        self.indicator.write(on);
    }

    fn set_session(&self, on: bool) {
        if let Some(pin) = &self.session {
            pin.write(on);
        }
    }

    fn settle(&self) -> u32 {
        let session = self.session.as_ref().map_or(0, GuardedPin::settle);
        self.output.settle() + self.indicator.settle() + session
    }
}

/// Single-ended MCP3008 channel. Readings are scaled from 10 to 12 bits so
/// thresholds are expressed on a 0..=4095 scale.
pub struct Mcp3008 {
    spi: Spi,
    channel: u8,
}

impl Mcp3008 {
    pub fn new(channel: u8) -> Result<Self> {
        if channel > 7 {
            return Err(HwError::AdcChannel(channel));
        }
        let spi = Spi::new(Bus::Spi0, SlaveSelect::Ss0, 1_350_000, Mode::Mode0)
            .map_err(|e| HwError::Spi(e.to_string()))?;
        Ok(Self { spi, channel })
    }

    fn read_raw(&mut self) -> Result<u16> {
        let tx = [0x01, (0x08 | self.channel) << 4, 0x00];
        let mut rx = [0u8; 3];
        self.spi
            .transfer(&mut rx, &tx)
            .map_err(|e| HwError::Spi(e.to_string()))?;
        Ok((u16::from(rx[1] & 0x03) << 8) | u16::from(rx[2]))
    }
}

impl AnalogInput for Mcp3008 {
    fn read_level(&mut self) -> std::result::Result<u16, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.read_raw()? << 2)
    }
}
