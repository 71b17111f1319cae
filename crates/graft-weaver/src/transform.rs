//! Top-level transformation of one type

use crate::advice::{AdviceBinding, AdviceTypeVisitor};
use crate::chain::MixinTypeVisitor;
use crate::config::WeaveConfig;
use crate::error::WeaveError;
use crate::mixin::MixinDescription;
use crate::resolver::DonorResolver;
use crate::safety_net::SafetyNet;
use graft_bytecode::{
    verify_type, FieldInfo, MethodInfo, MethodVisitor, TypeHeader, TypeNode, TypeVisitor,
    TypeWriter,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Everything to apply to one target type
///
/// Plans come from whatever layer decides which types get which mixins and
/// advice; the transformer only executes them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformPlan {
    /// Mixins, merged in this order
    pub mixins: Vec<MixinDescription>,
    /// Advice bindings
    pub advice: Vec<AdviceBinding>,
}

impl TransformPlan {
    /// Empty plan
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a mixin
    pub fn mixin(mut self, description: MixinDescription) -> Self {
        self.mixins.push(description);
        self
    }

    /// Add an advice binding
    pub fn advice(mut self, binding: AdviceBinding) -> Self {
        self.advice.push(binding);
        self
    }

    /// Whether applying the plan would change nothing
    pub fn is_empty(&self) -> bool {
        self.mixins.is_empty() && self.advice.is_empty()
    }
}

/// Rewrites type images according to a [`TransformPlan`]
///
/// Holds no per-type state, so one transformer can serve every thread.
pub struct Transformer {
    resolver: Arc<dyn DonorResolver>,
    safety_net: SafetyNet,
    verify: bool,
}

impl Transformer {
    /// Transformer with default settings
    pub fn new(resolver: Arc<dyn DonorResolver>) -> Self {
        Self::with_config(resolver, &WeaveConfig::default())
    }

    /// Transformer with explicit settings
    pub fn with_config(resolver: Arc<dyn DonorResolver>, config: &WeaveConfig) -> Self {
        Self {
            resolver,
            safety_net: config.safety_net(),
            verify: config.verify_output,
        }
    }

    /// The safety net placed behind advice
    pub fn safety_net(&self) -> &SafetyNet {
        &self.safety_net
    }

    /// Apply `plan` to the type image `bytes` and return the new image
    pub fn transform(&self, bytes: &[u8], plan: &TransformPlan) -> Result<Vec<u8>, WeaveError> {
        let target = TypeNode::decode(bytes).map_err(WeaveError::MalformedTarget)?;
        let name = target.header.name.clone();
        debug!(
            target_type = %name,
            mixins = plan.mixins.len(),
            advice = plan.advice.len(),
            "transforming type"
        );

        if let Some(binding) = plan.advice.iter().find(|b| !b.is_valid()) {
            return Err(WeaveError::InvalidAdvice(binding.advice.to_string()));
        }

        let mut writer = TypeWriter::new();
        {
            let mut chain: Box<dyn TypeVisitor<Error = WeaveError> + '_> =
                Box::new(Terminal(&mut writer));
            // the outermost mixin composes first, so build from the last one in
            for mixin in plan.mixins.iter().rev() {
                chain = Box::new(MixinTypeVisitor::new(chain, mixin.clone(), &*self.resolver));
            }
            let mut head = AdviceTypeVisitor::new(chain, plan.advice.clone(), &self.safety_net);
            target.accept(&mut head)?;
        }
        let image = writer.into_image()?;

        if self.verify {
            let node = TypeNode::from_image(&image)?;
            verify_type(&node).map_err(|source| {
                warn!(target_type = %name, error = %source, "transformed type failed verification");
                WeaveError::Verify {
                    name: name.clone(),
                    source,
                }
            })?;
        }

        debug!(target_type = %name, "transformed type");
        Ok(image.encode())
    }
}

/// Last stage of the chain, feeding the writer
struct Terminal<'w>(&'w mut TypeWriter);

impl TypeVisitor for Terminal<'_> {
    type Error = WeaveError;

    fn visit_header(&mut self, header: &TypeHeader) {
        self.0.visit_header(header);
    }

    fn visit_field(&mut self, field: &FieldInfo) {
        self.0.visit_field(field);
    }

    fn visit_method<'a>(&'a mut self, method: &MethodInfo) -> Box<dyn MethodVisitor + 'a> {
        self.0.visit_method(method)
    }

    fn visit_end(&mut self) -> Result<(), WeaveError> {
        Ok(self.0.visit_end()?)
    }
}
