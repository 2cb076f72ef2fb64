use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use color_eyre::eyre::Result;

use crate::errors::ChatError;
use crate::models::ChatItem;

/// ====== 콜백 호출기 ======

/// 정규화된 메시지마다 한 번씩 호출되는 호출자 제공 함수.
/// 에러 메시지에서 어느 콜백이 문제인지 알 수 있도록 이름을 함께 보관합니다.
pub struct Callback {
    name: String,
    func: Box<dyn FnMut(&ChatItem) -> Result<()> + Send>,
}

impl Callback {
    pub fn new(
        name: impl Into<String>,
        func: impl FnMut(&ChatItem) -> Result<()> + Send + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            func: Box::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback").field("name", &self.name).finish()
    }
}

/// 정규화된 메시지 하나를 콜백에 전달합니다. 호출은 정확히 한 번 일어납니다.
///
/// 콜백이 패닉하면 (아이템을 받을 수 없는 잘못된 콜백) 저수준 패닉 대신
/// 문제의 콜백 이름을 담은 `ChatError::Callback`으로 변환합니다.
/// 콜백이 스스로 반환한 에러는 여기서 건드리지 않고 그대로 전파합니다 —
/// 가로채는 실패 분류는 패닉 하나뿐입니다.
pub fn perform_callback(callback: &mut Callback, item: &ChatItem) -> Result<()> {
    let name = callback.name.clone();
    match panic::catch_unwind(AssertUnwindSafe(|| (callback.func)(item))) {
        Ok(result) => result,
        Err(_) => Err(ChatError::Callback(name).into()),
    }
}
