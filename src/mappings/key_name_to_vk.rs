/// Преобразование имён клавиш в виртуальные коды клавиш (VK_*)
/// Отвечает за трансляцию строковых имён из конфигурации в числовые коды и обратно
pub struct KeyNameToVk;

impl KeyNameToVk {
    /// Получить виртуальный код клавиши по её имени (регистронезависимо)
    pub fn translate(key_name: &str) -> Result<u32, String> {
        let normalized = key_name.trim().to_lowercase();

        // Одиночные буквы и цифры совпадают со своими ASCII кодами в верхнем регистре
        if normalized.len() == 1 {
            if let Some(c) = normalized.chars().next() {
                if c.is_ascii_lowercase() {
                    return Ok(c.to_ascii_uppercase() as u32);
                }
                if c.is_ascii_digit() {
                    return Ok(c as u32);
                }
            }
        }

        // Функциональные клавиши F1-F24
        if let Some(number) = normalized.strip_prefix('f') {
            if let Ok(n) = number.parse::<u32>() {
                if (1..=24).contains(&n) {
                    return Ok(0x6F + n); // VK_F1 = 0x70
                }
            }
        }

        // Numpad цифры
        if let Some(number) = normalized
            .strip_prefix("numpad")
            .or_else(|| normalized.strip_prefix("num"))
            .or_else(|| normalized.strip_prefix("kp"))
        {
            if let Ok(n) = number.parse::<u32>() {
                if n <= 9 {
                    return Ok(0x60 + n); // VK_NUMPAD0
                }
            }
        }

        let code = match normalized.as_str() {
            // Специальные клавиши
            "space" => 0x20,                       // VK_SPACE
            "enter" | "return" => 0x0D,            // VK_RETURN
            "escape" | "esc" => 0x1B,              // VK_ESCAPE
            "backspace" | "back" => 0x08,          // VK_BACK
            "tab" => 0x09,                         // VK_TAB

            // Навигация/редакция
            "insert" | "ins" => 0x2D,              // VK_INSERT
            "delete" | "del" => 0x2E,              // VK_DELETE
            "home" => 0x24,                        // VK_HOME
            "end" => 0x23,                         // VK_END
            "pageup" | "pgup" | "prior" => 0x21,   // VK_PRIOR
            "pagedown" | "pgdn" | "next" => 0x22,  // VK_NEXT

            // Стрелки
            "left" => 0x25,                        // VK_LEFT
            "up" => 0x26,                          // VK_UP
            "right" => 0x27,                       // VK_RIGHT
            "down" => 0x28,                        // VK_DOWN

            // Системные
            "printscreen" | "prtsc" | "snapshot" => 0x2C, // VK_SNAPSHOT
            "scrolllock" | "scroll" => 0x91,       // VK_SCROLL
            "pause" => 0x13,                       // VK_PAUSE

            // Numpad операции
            "nummultiply" | "kpmultiply" | "multiply" => 0x6A, // VK_MULTIPLY
            "numadd" | "kpadd" | "add" => 0x6B,    // VK_ADD
            "numsubtract" | "kpsubtract" | "subtract" => 0x6D, // VK_SUBTRACT
            "numdecimal" | "kpdecimal" | "decimal" => 0x6E, // VK_DECIMAL
            "numdivide" | "kpdivide" | "divide" => 0x6F, // VK_DIVIDE

            // Знаки пунктуации (раскладка US)
            "semicolon" | ";" => 0xBA,             // VK_OEM_1
            "equal" | "equals" | "plus" | "=" => 0xBB, // VK_OEM_PLUS
            "comma" | "," => 0xBC,                 // VK_OEM_COMMA
            "minus" | "-" => 0xBD,                 // VK_OEM_MINUS
            "period" | "dot" | "." => 0xBE,        // VK_OEM_PERIOD
            "slash" | "/" => 0xBF,                 // VK_OEM_2
            "grave" | "backquote" | "tilde" | "`" => 0xC0, // VK_OEM_3
            "leftbracket" | "leftbrace" | "[" => 0xDB, // VK_OEM_4
            "backslash" | "\\" => 0xDC,            // VK_OEM_5
            "rightbracket" | "rightbrace" | "]" => 0xDD, // VK_OEM_6
            "apostrophe" | "quote" | "'" => 0xDE,  // VK_OEM_7

            _ => return Err(format!("Unknown key: {}", key_name)),
        };

        Ok(code)
    }

    /// Получить каноническое отображаемое имя клавиши по виртуальному коду
    pub fn reverse_translate(vk: u32) -> Option<String> {
        let name = match vk {
            0x41..=0x5A | 0x30..=0x39 => return char::from_u32(vk).map(|c| c.to_string()),
            0x70..=0x87 => return Some(format!("F{}", vk - 0x6F)),
            0x60..=0x69 => return Some(format!("Num{}", vk - 0x60)),

            0x20 => "Space",
            0x0D => "Enter",
            0x1B => "Esc",
            0x08 => "Backspace",
            0x09 => "Tab",

            0x2D => "Insert",
            0x2E => "Delete",
            0x24 => "Home",
            0x23 => "End",
            0x21 => "PageUp",
            0x22 => "PageDown",

            0x25 => "Left",
            0x26 => "Up",
            0x27 => "Right",
            0x28 => "Down",

            0x2C => "PrintScreen",
            0x91 => "ScrollLock",
            0x13 => "Pause",

            0x6A => "NumMultiply",
            0x6B => "NumAdd",
            0x6D => "NumSubtract",
            0x6E => "NumDecimal",
            0x6F => "NumDivide",

            0xBA => "Semicolon",
            0xBB => "Equal",
            0xBC => "Comma",
            0xBD => "Minus",
            0xBE => "Period",
            0xBF => "Slash",
            0xC0 => "Grave",
            0xDB => "LeftBracket",
            0xDC => "Backslash",
            0xDD => "RightBracket",
            0xDE => "Apostrophe",

            _ => return None,
        };

        Some(name.to_string())
    }
}
